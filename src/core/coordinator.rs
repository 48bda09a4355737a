//! Startup, run-state and ordered teardown of the daemon.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::core::ServiceIdentity;
use crate::discovery::{Advertisement, Advertiser, DiscoveryBackend};
use crate::error::{Error, ServeError};
use crate::rpc::{Listener, RpcService};
use crate::signals::TerminationSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why the daemon left `Running`.
enum Exit {
    Signal,
    Failed(ServeError),
}

type ServeTask = JoinHandle<Result<(), ServeError>>;

pub struct Coordinator {
    config: Arc<AppConfig>,
    service: Arc<dyn RpcService>,
    advertiser: Advertiser,
    phase: watch::Sender<Phase>,
}

impl Coordinator {
    pub fn new(
        config: Arc<AppConfig>,
        service: Arc<dyn RpcService>,
        discovery: Arc<dyn DiscoveryBackend>,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Starting);
        Self {
            config,
            service,
            advertiser: Advertiser::new(discovery),
            phase,
        }
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: Phase) {
        info!(phase = %phase, "Daemon phase changed");
        self.phase.send_replace(phase);
    }

    /// Run the daemon until the first termination signal or a transport failure.
    ///
    /// The listener is bound before anything is advertised, so a bind failure
    /// never leaves a record behind. The advertisement is retracted on every
    /// path that acquired it.
    pub async fn run(self, signals: mpsc::Receiver<TerminationSignal>) -> Result<(), Error> {
        info!(
            service = %self.config.service_name,
            version = crate::VERSION,
            "Conreality Master starting"
        );

        let listener = match Listener::bind(&self.config.bind_address, self.config.port).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Startup failed");
                self.enter(Phase::Stopped);
                return Err(e.into());
            }
        };
        let port = listener.local_addr().port();

        let cancel = CancellationToken::new();
        let serve_task: ServeTask =
            tokio::spawn(listener.serve(self.service.clone(), cancel.clone()));

        let identity = ServiceIdentity::new(&self.config, port);
        let advertisement = match self.advertiser.register(&identity) {
            Ok(advertisement) => advertisement,
            Err(e) => {
                error!(error = %e, "Startup failed");
                stop_listener(&cancel, serve_task).await;
                self.enter(Phase::Stopped);
                return Err(e.into());
            }
        };

        self.supervise(advertisement, serve_task, cancel, signals).await
    }

    /// Hold `Running` until a signal arrives or the serve task ends, then
    /// retract and stop.
    async fn supervise(
        &self,
        mut advertisement: Advertisement,
        mut serve_task: ServeTask,
        cancel: CancellationToken,
        mut signals: mpsc::Receiver<TerminationSignal>,
    ) -> Result<(), Error> {
        self.enter(Phase::Running);

        let exit = tokio::select! {
            signal = signals.recv() => {
                match signal {
                    Some(signal) => info!(signal = %signal, "Termination signal received"),
                    None => warn!("Signal channel closed, shutting down"),
                }
                Exit::Signal
            }
            joined = &mut serve_task => Exit::Failed(serve_failure(joined)),
        };

        self.enter(Phase::ShuttingDown);
        // Later signals are dropped on the floor.
        drop(signals);

        // Withdrawing may wait on the network; keep it off the async workers.
        let retraction = tokio::task::spawn_blocking(move || advertisement.retract());
        if let Err(e) = retraction.await {
            warn!(error = %e, "Retraction task did not finish cleanly");
        }
        println!();

        let result = match exit {
            Exit::Signal => {
                stop_listener(&cancel, serve_task).await;
                Ok(())
            }
            Exit::Failed(e) => {
                cancel.cancel();
                error!(error = %e, "RPC transport failed");
                Err(e.into())
            }
        };

        self.enter(Phase::Stopped);
        info!("Conreality Master stopped");
        result
    }
}

/// Cancel the serve loop and wait for it to release the socket.
async fn stop_listener(cancel: &CancellationToken, serve_task: ServeTask) {
    cancel.cancel();
    match serve_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "RPC listener failed while stopping"),
        Err(e) => warn!(error = %e, "RPC listener task did not finish cleanly"),
    }
}

/// The serve loop only returns on its own when something went wrong.
fn serve_failure(joined: Result<Result<(), ServeError>, JoinError>) -> ServeError {
    match joined {
        Ok(Ok(())) => ServeError::Closed,
        Ok(Err(e)) => e,
        Err(e) => ServeError::Panicked(e.to_string()),
    }
}
