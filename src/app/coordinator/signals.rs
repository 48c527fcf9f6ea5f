//! Signal handling for cancelling a run
//!
//! CTRL-C and SIGTERM cancel a shared [`CancellationToken`]. The retry loop,
//! in-flight downloads and the coordinator all observe the same token.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels a token when the process is asked to stop
pub struct SignalHandler {
    cancel: CancellationToken,
}

impl SignalHandler {
    /// Create a new signal handler for the given token
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Spawn the background task that waits for CTRL-C or SIGTERM
    ///
    /// The task ends on its own once the token is cancelled by anyone.
    pub fn setup(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, cancelling run");
                    cancel.cancel();
                },
                _ = terminate => {
                    info!("Received terminate signal, cancelling run");
                    cancel.cancel();
                },
                _ = cancel.cancelled() => {},
            }
        })
    }
}
