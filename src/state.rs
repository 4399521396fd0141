//! Shared application state for request handlers.

use std::sync::Arc;

use crate::server::Identity;

/// State cloned into every handler of the application router.
#[derive(Clone)]
pub struct AppState {
    pub identity: Identity,
    pub fqdn: Arc<str>,
}

impl AppState {
    pub fn new(identity: Identity, fqdn: &str) -> Self {
        Self {
            identity,
            fqdn: Arc::from(fqdn),
        }
    }
}
