//! Host termination signals.
//!
//! Interrupt (Ctrl+C) and, on Unix, SIGTERM are forwarded into a channel
//! every time they arrive. No other signal is intercepted.

use tokio::signal;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Install the handlers and return the receiving end.
///
/// On Unix both handlers are registered before this returns, so a signal
/// raised afterwards is never lost. Forwarding stops once the receiver is
/// dropped. Must be called from within a tokio runtime.
pub fn listen() -> mpsc::Receiver<TerminationSignal> {
    let (tx, rx) = mpsc::channel(4);

    #[cfg(unix)]
    {
        use signal::unix::SignalKind;

        for (kind, forwarded) in [
            (SignalKind::interrupt(), TerminationSignal::Interrupt),
            (SignalKind::terminate(), TerminationSignal::Terminate),
        ] {
            match signal::unix::signal(kind) {
                Ok(stream) => {
                    tokio::spawn(forward(stream, forwarded, tx.clone()));
                }
                Err(e) => {
                    error!(signal = %forwarded, error = %e, "Failed to install signal handler");
                    // Keep a sender alive so the channel does not read as closed.
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        std::future::pending::<()>().await;
                        drop(tx);
                    });
                }
            }
        }
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        loop {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            if tx.send(TerminationSignal::Interrupt).await.is_err() {
                return;
            }
        }
    });

    rx
}

#[cfg(unix)]
async fn forward(
    mut stream: signal::unix::Signal,
    forwarded: TerminationSignal,
    tx: mpsc::Sender<TerminationSignal>,
) {
    while stream.recv().await.is_some() {
        if tx.send(forwarded).await.is_err() {
            return;
        }
    }
}
