#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use conreald::config::AppConfig;
use conreald::core::{Coordinator, Phase};
use conreald::discovery::{DiscoveryController, SimulatedBackend};
use conreald::rpc::{MasterService, RpcService};
use conreald::signals::TerminationSignal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

pub fn loopback_config(port: u16) -> AppConfig {
    AppConfig {
        bind_address: "127.0.0.1".to_string(),
        port,
        simulation: true,
        ..Default::default()
    }
}

/// A coordinator running on its own task with simulated discovery.
pub struct Daemon {
    pub addr: SocketAddr,
    pub phase: watch::Receiver<Phase>,
    pub signals: mpsc::Sender<TerminationSignal>,
    pub control: DiscoveryController,
    pub task: JoinHandle<conreald::Result<()>>,
}

impl Daemon {
    pub fn start(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let service: Arc<dyn RpcService> = Arc::new(MasterService::new(config.clone()));
        Self::start_with(config, service, |_| {})
    }

    pub fn start_with(
        config: Arc<AppConfig>,
        service: Arc<dyn RpcService>,
        prepare: impl FnOnce(&DiscoveryController),
    ) -> Self {
        let (backend, control) = SimulatedBackend::new();
        prepare(&control);

        let addr = SocketAddr::new(
            config.bind_address.parse().expect("loopback address"),
            config.port,
        );
        let coordinator = Coordinator::new(config, service, Arc::new(backend));
        let phase = coordinator.subscribe();
        let (signals, rx) = mpsc::channel(4);
        let task = tokio::spawn(coordinator.run(rx));

        Self {
            addr,
            phase,
            signals,
            control,
            task,
        }
    }

    pub async fn wait_running(&mut self) {
        timeout(WAIT, self.phase.wait_for(|p| *p == Phase::Running))
            .await
            .expect("timeout waiting for Running")
            .expect("coordinator exited before Running");
    }

    pub async fn finish(self) -> conreald::Result<()> {
        timeout(WAIT, self.task)
            .await
            .expect("timeout waiting for coordinator")
            .expect("coordinator task panicked")
    }
}
