use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError,
};

/// Which kind of listener failed to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Tls,
    Plain,
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Tls => f.write_str("TLS"),
            ListenerKind::Plain => f.write_str("non-TLS"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create local client to talk to the overlay API: {0}")]
    ClientInit(#[source] BoxError),

    #[error("Failed to get overlay status: {0}")]
    StatusQuery(#[source] BoxError),

    #[error("Failed to listen {kind} at [{addr}]: {source}")]
    Listen {
        addr: String,
        kind: ListenerKind,
        #[source]
        source: BoxError,
    },

    #[error("Failed to get caller identity from the overlay API: {0}")]
    IdentityLookup(#[source] BoxError),

    #[error("Server is not initialized")]
    NotInitialized,

    #[error("Overlay node did not come up after {attempts} attempts")]
    BringUpExhausted { attempts: u32 },

    #[error(transparent)]
    Close(BoxError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}
