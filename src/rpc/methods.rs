//! The service capability served over the transport.
//!
//! The listener only knows the [`RpcService`] contract. [`MasterService`] is
//! the implementation the daemon binary ships with.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;

use super::protocol::RpcError;

/// Set of remotely invocable methods.
///
/// Calls are made concurrently from independent connection tasks.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Daemon-level methods of the Conreality master.
pub struct MasterService {
    config: Arc<AppConfig>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl MasterService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    fn version(&self) -> Value {
        serde_json::json!({
            "name": crate::PRODUCT_NAME,
            "version": crate::VERSION,
        })
    }

    fn status(&self) -> Result<Value, RpcError> {
        #[derive(Serialize)]
        struct DaemonStatus<'a> {
            version: &'static str,
            uptime_secs: u64,
            started_at: String,
            service_name: &'a str,
            bind_address: &'a str,
            port: u16,
        }

        serde_json::to_value(DaemonStatus {
            version: crate::VERSION,
            uptime_secs: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            service_name: &self.config.service_name,
            bind_address: &self.config.bind_address,
            port: self.config.port,
        })
        .map_err(|e| RpcError::internal(e.to_string()))
    }
}

#[async_trait]
impl RpcService for MasterService {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        match method {
            "daemon.ping" => Ok(Value::String("pong".to_string())),
            "daemon.version" => Ok(self.version()),
            "daemon.status" => self.status(),
            _ => Err(RpcError::method_not_found(method)),
        }
    }
}
