//! Signal-driven cancellation
//!
//! Ctrl+C (or SIGTERM) cancels the run's token. Workers notice it at their
//! next checkpoint, so the file or table in flight still finishes.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancel `cancel` on the first shutdown signal
///
/// The monitor exits on its own once the token is cancelled from elsewhere.
pub fn spawn_cancellation_monitor(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                warn!("Shutdown requested, stopping after the current unit of work");
                eprintln!("Stopping after the current unit of work...");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
