use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use super::DiscoveryBackend;
use crate::core::ServiceIdentity;
use crate::error::{RegistrationError, RetractionError};

/// A record held by the simulated backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub key: String,
    pub identity: ServiceIdentity,
}

#[derive(Debug)]
struct State {
    reachable: bool,
    records: Vec<PublishedRecord>,
    publishes: usize,
    withdrawals: usize,
}

/// In-process discovery mechanism.
pub struct SimulatedBackend {
    state: Arc<Mutex<State>>,
}

/// Controls and inspects a [`SimulatedBackend`] from the outside.
#[derive(Clone)]
pub struct DiscoveryController {
    state: Arc<Mutex<State>>,
}

impl SimulatedBackend {
    pub fn new() -> (Self, DiscoveryController) {
        let state = Arc::new(Mutex::new(State {
            reachable: true,
            records: Vec::new(),
            publishes: 0,
            withdrawals: 0,
        }));

        (
            Self {
                state: state.clone(),
            },
            DiscoveryController { state },
        )
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DiscoveryBackend for SimulatedBackend {
    fn publish(&self, identity: &ServiceIdentity) -> Result<String, RegistrationError> {
        let mut state = lock(&self.state);
        state.publishes += 1;

        if !state.reachable {
            return Err(RegistrationError::Unreachable(
                "simulated discovery is offline".into(),
            ));
        }

        let key = format!("{}.{}", identity.name, identity.service_type());
        if state.records.iter().any(|r| r.key == key) {
            return Err(RegistrationError::Rejected(format!("{key} is already published")));
        }

        info!(key = %key, port = identity.port, "(SimulatedDiscovery) Published record");
        state.records.push(PublishedRecord {
            key: key.clone(),
            identity: identity.clone(),
        });
        Ok(key)
    }

    fn withdraw(&self, key: &str) -> Result<(), RetractionError> {
        let mut state = lock(&self.state);
        state.withdrawals += 1;

        if !state.reachable {
            return Err(RetractionError::Unreachable(
                "simulated discovery is offline".into(),
            ));
        }

        let before = state.records.len();
        state.records.retain(|r| r.key != key);
        if state.records.len() == before {
            return Err(RetractionError::Unknown(key.to_string()));
        }

        info!(key = %key, "(SimulatedDiscovery) Withdrew record");
        Ok(())
    }
}

impl DiscoveryController {
    /// Make the mechanism unreachable (or reachable again).
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.state).reachable = reachable;
    }

    /// Records currently published.
    pub fn published(&self) -> Vec<PublishedRecord> {
        lock(&self.state).records.clone()
    }

    /// Number of publish attempts, successful or not.
    pub fn publish_count(&self) -> usize {
        lock(&self.state).publishes
    }

    /// Number of withdraw attempts, successful or not.
    pub fn withdraw_count(&self) -> usize {
        lock(&self.state).withdrawals
    }
}
