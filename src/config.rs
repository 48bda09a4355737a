//! Daemon configuration.
//!
//! Values are layered with figment: built-in defaults, then a config file,
//! then `CONREALD_*` environment variables. The result is read once at
//! startup and shared as an immutable `Arc<AppConfig>`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "CONREALD_";

const CONFIG_STEM: &str = "config";
const CONFIG_EXTENSIONS: [&str; 3] = ["toml", "yaml", "yml"];
const HOME_CONFIG_DIR: &str = ".conreality";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interface the RPC listener binds to.
    pub bind_address: String,
    pub port: u16,
    /// Instance name published in the discovery record.
    pub service_name: String,
    /// Discovery service type, e.g. `_conreality._tcp`.
    pub protocol: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    /// Advertise through the in-process simulated backend instead of mDNS.
    pub simulation: bool,

    /// The file the values were read from, if any.
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5555,
            service_name: "conreality".to_string(),
            protocol: "_conreality._tcp".to_string(),
            log_json: false,
            simulation: false,
            config_file: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// An explicit `config_file` must exist. Without one, the first existing
    /// `config.{toml,yaml,yml}` in the working directory or in
    /// `$HOME/.conreality` is used, and having none is fine.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(path) => return Err(ConfigError::NotFound(path.to_path_buf())),
            None => search_paths().into_iter().find(|p| p.is_file()),
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = &file {
            figment = merge_file(figment, path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let mut config = Self::from_figment(figment)?;
        config.config_file = file;
        Ok(config)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be between 1 and 65535".into()));
        }
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation("bind_address must not be empty".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Validation("service_name must not be empty".into()));
        }
        if self.protocol.trim().is_empty() {
            return Err(ConfigError::Validation("protocol must not be empty".into()));
        }
        Ok(())
    }

    /// Metadata strings attached to the discovery record.
    pub fn version_metadata(&self) -> Vec<String> {
        vec![format!("version={}", crate::VERSION)]
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

/// Candidate config files, in lookup order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(HOME_CONFIG_DIR));
    }

    dirs.iter()
        .flat_map(|dir| {
            CONFIG_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{CONFIG_STEM}.{ext}")))
        })
        .collect()
}
