//! TCP transport for the RPC service.
//!
//! Newline-delimited JSON-RPC framing; each connection is served on its own
//! task so a slow call never holds up `accept`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::methods::RpcService;
use super::protocol::{Request, Response};
use crate::error::{BindError, Error, ServeError};
use crate::logging::LogThrottle;

/// Pause after the process runs out of descriptors or buffers.
const EXHAUSTION_BACKOFF: Duration = Duration::from_millis(100);

/// A bound, not yet accepting, RPC socket.
///
/// The socket is owned by whichever task runs [`Listener::serve`] and is
/// closed when that call returns.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `bind_address:port`. Host names are resolved; port 0 picks a free port.
    pub async fn bind(bind_address: &str, port: u16) -> Result<Self, BindError> {
        let addr = format!("{bind_address}:{port}");
        let inner = TcpListener::bind((bind_address, port))
            .await
            .map_err(|source| BindError {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| BindError { addr, source })?;

        info!(addr = %local_addr, "RPC listener bound");
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and serve connections until `cancel` fires.
    ///
    /// Returns `Ok(())` only after cancellation. Transient accept errors are
    /// logged and skipped; anything else ends the loop with a `ServeError`.
    pub async fn serve(
        self,
        service: Arc<dyn RpcService>,
        cancel: CancellationToken,
    ) -> Result<(), ServeError> {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        info!(addr = %self.local_addr, "RPC server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(addr = %self.local_addr, "RPC server shutting down");
                    break;
                }
                accepted = self.inner.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let service = service.clone();
                            let cancel = cancel.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, service, cancel).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection error");
                                }
                                debug!(peer = %peer_addr, "Client disconnected");
                            });
                        }
                        Err(e) if is_transient(&e) => {
                            if throttle.should_log() {
                                warn!(error = %e, "Transient accept error");
                            }
                            if is_exhaustion(&e) {
                                tokio::time::sleep(EXHAUSTION_BACKOFF).await;
                            }
                        }
                        Err(e) => {
                            return Err(ServeError::Accept {
                                addr: self.local_addr.to_string(),
                                source: e,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Bind and then serve until `cancel` fires or the transport fails.
pub async fn bind_and_serve(
    bind_address: &str,
    port: u16,
    service: Arc<dyn RpcService>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let listener = Listener::bind(bind_address, port).await?;
    listener.serve(service, cancel).await?;
    Ok(())
}

/// Errors that affect a single pending connection, or that clear up once
/// descriptors are released.
pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || is_exhaustion(e)
}

fn is_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: Arc<dyn RpcService>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_line(&mut line) => read?,
        };

        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => {
                if let Err(msg) = request.validate() {
                    warn!(peer = %peer_addr, error = msg, "Invalid request");
                    let id = request.id.clone().unwrap_or(Value::Null);
                    Response::invalid_request(id)
                } else if request.is_notification() {
                    debug!(peer = %peer_addr, method = %request.method, "Notification received");
                    let params = request.params.unwrap_or(Value::Null);
                    let _ = service.call(&request.method, params).await;
                    continue;
                } else {
                    dispatch(service.as_ref(), request).await
                }
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "Parse error");
                Response::parse_error()
            }
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
    }

    Ok(())
}

async fn dispatch(service: &dyn RpcService, request: Request) -> Response {
    let id = request.id.unwrap_or(Value::Null);
    let params = request.params.unwrap_or(Value::Null);

    match service.call(&request.method, params).await {
        Ok(result) => Response::success(id, result),
        Err(error) => {
            debug!(method = %request.method, error = %error, "Call failed");
            Response::failure(id, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_level_errors_are_transient() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn descriptor_exhaustion_is_transient() {
        let e = io::Error::from_raw_os_error(libc::EMFILE);
        assert!(is_transient(&e));
        assert!(is_exhaustion(&e));
    }

    #[test]
    fn other_errors_are_fatal() {
        assert!(!is_transient(&io::Error::from_raw_os_error(libc::EBADF)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn bind_reports_address_on_failure() {
        let taken = Listener::bind("127.0.0.1", 0).await.unwrap();
        let port = taken.local_addr().port();

        let err = Listener::bind("127.0.0.1", port).await.unwrap_err();
        assert_eq!(err.addr, format!("127.0.0.1:{port}"));
        assert_eq!(err.source.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn invalid_address_fails_to_bind() {
        assert!(Listener::bind("not an address", 0).await.is_err());
    }
}
