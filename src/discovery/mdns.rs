use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceInfo, TxtProperty, UnregisterStatus};
use tracing::debug;

use super::DiscoveryBackend;
use crate::core::ServiceIdentity;
use crate::error::{RegistrationError, RetractionError};

/// Upper bound on waiting for the goodbye packets to go out.
const UNREGISTER_WAIT: Duration = Duration::from_secs(1);

/// Multicast DNS backend.
///
/// The responder daemon is started on the first publish and shut down by
/// the matching withdraw.
pub struct MdnsBackend {
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl MdnsBackend {
    pub fn new() -> Self {
        Self {
            daemon: Mutex::new(None),
        }
    }

    fn daemon(&self) -> MutexGuard<'_, Option<ServiceDaemon>> {
        self.daemon
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MdnsBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `<hostname>.local.`, falling back to the service name.
fn local_host_name(fallback: &str) -> String {
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback.to_string());

    format!("{host}.local.")
}

/// TXT entries in metadata order; bare keys are published without a value.
fn txt_properties(identity: &ServiceIdentity) -> Vec<TxtProperty> {
    identity
        .properties()
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) => TxtProperty::from((key.as_str(), value.as_str())),
            None => TxtProperty::from(key.as_str()),
        })
        .collect()
}

fn stop_daemon(daemon: &ServiceDaemon) {
    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon already stopped");
    }
}

impl DiscoveryBackend for MdnsBackend {
    fn publish(&self, identity: &ServiceIdentity) -> Result<String, RegistrationError> {
        let mut slot = self.daemon();
        let daemon = match slot.as_ref() {
            Some(daemon) => daemon.clone(),
            None => {
                let daemon = ServiceDaemon::new()
                    .map_err(|e| RegistrationError::Unreachable(e.to_string()))?;
                *slot = Some(daemon.clone());
                daemon
            }
        };

        let host_name = local_host_name(&identity.name);
        let registered = ServiceInfo::new(
            &identity.service_type(),
            &identity.name,
            &host_name,
            "",
            identity.port,
            txt_properties(identity),
        )
        .map_err(|e| RegistrationError::Rejected(e.to_string()))
        .and_then(|info| {
            let info = info.enable_addr_auto();
            let fullname = info.get_fullname().to_string();
            daemon
                .register(info)
                .map(|()| fullname)
                .map_err(|e| RegistrationError::Unreachable(e.to_string()))
        });

        match registered {
            Ok(fullname) => {
                debug!(fullname = %fullname, host = %host_name, "mDNS record registered");
                Ok(fullname)
            }
            Err(e) => {
                // Nothing is published, so the responder has no reason to keep running.
                if let Some(daemon) = slot.take() {
                    stop_daemon(&daemon);
                }
                Err(e)
            }
        }
    }

    fn withdraw(&self, key: &str) -> Result<(), RetractionError> {
        let Some(daemon) = self.daemon().take() else {
            return Err(RetractionError::Unknown(key.to_string()));
        };

        let status = daemon
            .unregister(key)
            .map_err(|e| RetractionError::Unreachable(e.to_string()))
            .map(|rx| rx.recv_timeout(UNREGISTER_WAIT));

        stop_daemon(&daemon);

        match status? {
            Ok(UnregisterStatus::OK) => Ok(()),
            Ok(UnregisterStatus::NotFound) => Err(RetractionError::Unknown(key.to_string())),
            Err(e) => Err(RetractionError::Unreachable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn host_name_is_local() {
        let name = local_host_name("conreality");
        assert!(name.ends_with(".local."));
        assert!(!name.starts_with('.'));
    }

    #[test]
    fn bare_metadata_key_has_no_value() {
        let identity = ServiceIdentity {
            metadata: vec!["version=0.1.0".into(), "master".into()],
            ..ServiceIdentity::new(&AppConfig::default(), 5555)
        };
        let txt = txt_properties(&identity);

        assert_eq!(txt[0].key(), "version");
        assert_eq!(txt[0].val(), Some("0.1.0".as_bytes()));
        assert_eq!(txt[1].key(), "master");
        assert_eq!(txt[1].val(), None);
    }

    #[test]
    fn rejected_record_releases_the_responder() {
        let backend = MdnsBackend::new();
        let identity = ServiceIdentity {
            protocol: "not-a-service-type".into(),
            ..ServiceIdentity::new(&AppConfig::default(), 5555)
        };

        // Either the responder could not start or the record was refused;
        // in both cases nothing may be left running.
        assert!(backend.publish(&identity).is_err());
        assert!(backend.daemon().is_none());
    }

    #[test]
    fn withdraw_without_publish_is_unknown() {
        let backend = MdnsBackend::new();
        assert!(matches!(
            backend.withdraw("conreality._conreality._tcp.local."),
            Err(RetractionError::Unknown(_))
        ));
    }
}
