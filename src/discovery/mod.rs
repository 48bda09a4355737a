//! Local network service discovery.
//!
//! The [`Advertiser`] publishes the daemon's [`ServiceIdentity`] through a
//! [`DiscoveryBackend`] and hands back an [`Advertisement`] that withdraws the
//! record exactly once, either explicitly or when dropped.

mod mdns;
mod simulated;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::core::ServiceIdentity;
use crate::error::{RegistrationError, RetractionError};

pub use mdns::MdnsBackend;
pub use simulated::{DiscoveryController, PublishedRecord, SimulatedBackend};

/// A local discovery mechanism.
///
/// Both calls are synchronous. `withdraw` may wait a bounded time for the
/// network to confirm, so async callers run it on the blocking pool.
pub trait DiscoveryBackend: Send + Sync {
    /// Publish the record and return a key identifying the registration.
    fn publish(&self, identity: &ServiceIdentity) -> Result<String, RegistrationError>;

    /// Remove a previously published record.
    fn withdraw(&self, key: &str) -> Result<(), RetractionError>;
}

/// Pick the backend for this run.
pub fn get_backend(simulation: bool) -> Arc<dyn DiscoveryBackend> {
    if simulation {
        let (backend, _control) = SimulatedBackend::new();
        return Arc::new(backend);
    }

    Arc::new(MdnsBackend::new())
}

/// Registers service records, at most one live at a time.
pub struct Advertiser {
    backend: Arc<dyn DiscoveryBackend>,
    active: Arc<AtomicBool>,
}

impl Advertiser {
    pub fn new(backend: Arc<dyn DiscoveryBackend>) -> Self {
        Self {
            backend,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register(&self, identity: &ServiceIdentity) -> Result<Advertisement, RegistrationError> {
        identity.validate()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RegistrationError::AlreadyRegistered);
        }

        match self.backend.publish(identity) {
            Ok(key) => {
                info!(
                    service = %identity.name,
                    service_type = %identity.service_type(),
                    port = identity.port,
                    "Service advertised"
                );
                Ok(Advertisement {
                    key,
                    backend: self.backend.clone(),
                    active: self.active.clone(),
                    retracted: false,
                })
            }
            Err(e) => {
                self.active.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Whether an advertisement is currently live.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// A live registration. Retracts itself on drop if not retracted earlier.
pub struct Advertisement {
    key: String,
    backend: Arc<dyn DiscoveryBackend>,
    active: Arc<AtomicBool>,
    retracted: bool,
}

impl Advertisement {
    pub fn is_retracted(&self) -> bool {
        self.retracted
    }

    /// Withdraw the record. Only the first call reaches the backend;
    /// failures are logged, never returned.
    pub fn retract(&mut self) {
        if self.retracted {
            debug!(key = %self.key, "Advertisement already retracted");
            return;
        }
        self.retracted = true;

        match self.backend.withdraw(&self.key) {
            Ok(()) => info!(key = %self.key, "Service advertisement retracted"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to retract service advertisement"),
        }
        self.active.store(false, Ordering::Release);
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        self.retract();
    }
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("key", &self.key)
            .field("retracted", &self.retracted)
            .finish()
    }
}
