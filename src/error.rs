//! Error taxonomy for the daemon.
//!
//! Startup failures (`BindError`, `RegistrationError`) and asynchronous
//! transport failures (`ServeError`) are fatal and surface through [`Error`].
//! `RetractionError` is only ever logged.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The listening socket could not be bound.
#[derive(Debug, Error)]
#[error("failed to bind RPC listener on {addr}: {source}")]
pub struct BindError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// The accept loop failed after a successful bind.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("RPC listener on {addr} failed: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("RPC listener stopped unexpectedly")]
    Closed,
    #[error("RPC listener task panicked: {0}")]
    Panicked(String),
}

/// Publishing the service record failed.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("discovery mechanism unreachable: {0}")]
    Unreachable(String),
    #[error("service record rejected: {0}")]
    Rejected(String),
    #[error("a service advertisement is already active")]
    AlreadyRegistered,
}

/// Withdrawing the service record failed.
#[derive(Debug, Error)]
pub enum RetractionError {
    #[error("discovery mechanism unreachable: {0}")]
    Unreachable(String),
    #[error("unknown registration: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Fatal daemon errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
