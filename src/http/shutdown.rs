//! Graceful shutdown and signal handling.
//!
//! A single signal task flips a watch channel; every serve loop holds a
//! receiver and drains its connections once the flag is set.

use std::sync::Arc;

use tokio::sync::watch;

/// Spawns a task that signals shutdown on SIGTERM or SIGINT.
pub fn setup_shutdown_handler(trigger: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = trigger.closed() => {
                return;
            }
        }

        let _ = trigger.send(true);
    });
}

/// Resolves once shutdown has been requested or the sender is gone.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}
