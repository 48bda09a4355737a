pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod signals;

pub use error::{Error, Result};

pub const PRODUCT_NAME: &str = "Conreality Master";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
