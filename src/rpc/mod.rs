//! RPC transport for the daemon.
//!
//! JSON-RPC 2.0 over TCP, one JSON object per line.
//!
//! ## Architecture
//!
//! - `protocol`: JSON-RPC 2.0 request/response types
//! - `transport`: the listener and its accept loop
//! - `methods`: the service contract and the built-in master service
//! - `client`: client for calling a running daemon

pub mod client;
pub mod methods;
mod protocol;
mod transport;

pub use client::{ClientError, RpcClient};
pub use methods::{MasterService, RpcService};
pub use protocol::{Request, Response, RpcError};
pub use transport::{Listener, bind_and_serve};
