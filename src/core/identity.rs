use crate::config::AppConfig;
use crate::error::RegistrationError;

/// Discovery domain the record is published under.
pub const DISCOVERY_DOMAIN: &str = "local.";

/// What the daemon advertises about itself. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    /// Service type such as `_conreality._tcp`.
    pub protocol: String,
    pub port: u16,
    /// `key=value` strings, published in order.
    pub metadata: Vec<String>,
}

impl ServiceIdentity {
    /// Identity for a listener bound on `port`.
    pub fn new(config: &AppConfig, port: u16) -> Self {
        Self {
            name: config.service_name.clone(),
            protocol: config.protocol.clone(),
            port,
            metadata: config.version_metadata(),
        }
    }

    /// Fully qualified service type, e.g. `_conreality._tcp.local.`.
    pub fn service_type(&self) -> String {
        format!("{}.{}", self.protocol.trim_end_matches('.'), DISCOVERY_DOMAIN)
    }

    /// Metadata split into `(key, value)` pairs. Entries without `=` are
    /// bare keys and carry no value.
    pub fn properties(&self) -> Vec<(String, Option<String>)> {
        self.metadata
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (entry.clone(), None),
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::Rejected("service name is empty".into()));
        }
        if self.port == 0 {
            return Err(RegistrationError::Rejected("port must be non-zero".into()));
        }
        if !is_service_type(&self.protocol) {
            return Err(RegistrationError::Rejected(format!(
                "malformed service type: {:?}",
                self.protocol
            )));
        }
        if self.metadata.iter().any(|entry| entry.starts_with('=')) {
            return Err(RegistrationError::Rejected("metadata key is empty".into()));
        }
        Ok(())
    }
}

/// `_<name>._tcp` or `_<name>._udp`, with an optional trailing dot.
fn is_service_type(protocol: &str) -> bool {
    let protocol = protocol.strip_suffix('.').unwrap_or(protocol);
    let Some((name, transport)) = protocol.rsplit_once('.') else {
        return false;
    };
    let Some(name) = name.strip_prefix('_') else {
        return false;
    };

    matches!(transport, "_tcp" | "_udp")
        && !name.is_empty()
        && name.len() <= 15
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
