//! Serving routers on provisioned listeners.
//!
//! Each TLS listener gets the application router; the redirect listener, if
//! present, gets its redirect handler. All of them stop together on the first
//! shutdown signal or the first failed listener.

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::local::{LocalListener, PeerAddr};
use crate::server::Listeners;

use super::shutdown::{setup_shutdown_handler, wait_for_shutdown};

/// Server runtime error
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Serve `app` on every TLS listener and the redirect handler on the plaintext
/// listener.
///
/// This function blocks until the server shuts down.
pub async fn serve(listeners: Listeners<LocalListener>, app: Router) -> Result<(), ServeError> {
    let (trigger, shutdown) = watch::channel(false);
    let trigger = Arc::new(trigger);
    setup_shutdown_handler(Arc::clone(&trigger));

    let mut tasks = JoinSet::new();

    for listener in listeners.tls {
        if let Ok(addr) = axum::serve::Listener::local_addr(&listener) {
            tracing::info!(%addr, "Starting HTTPS server");
        }
        let service = app.clone().into_make_service_with_connect_info::<PeerAddr>();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(wait_for_shutdown(shutdown))
                .await
        });
    }

    if let Some(redirect) = listeners.redirect {
        if let Ok(addr) = axum::serve::Listener::local_addr(&redirect.listener) {
            tracing::info!(%addr, "Starting HTTP->HTTPS redirect server");
        }
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            axum::serve(redirect.listener, redirect.handler)
                .with_graceful_shutdown(wait_for_shutdown(shutdown))
                .await
        });
    }

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(ServeError::from)
            .and_then(|served| served.map_err(ServeError::from));
        if let Err(e) = outcome {
            tracing::error!(error = %e, "Server stopped with error, shutting down remaining listeners");
            let _ = trigger.send(true);
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    tracing::info!("All listeners stopped");
    result
}
