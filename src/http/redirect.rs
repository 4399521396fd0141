//! HTTP to HTTPS redirect handler.
//!
//! Every plaintext request is answered with `302 Found` pointing at the same
//! path and query on the node's canonical name. The incoming `Host` is never
//! used, so the redirect cannot be steered to another origin.

use std::sync::Arc;

use axum::http::{header::LOCATION, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

/// Router that redirects all requests to `https://<hostname>`.
pub fn redirect_router(hostname: impl Into<String>) -> Router {
    let hostname: Arc<str> = hostname.into().into();

    Router::new().fallback(move |uri: Uri| {
        let hostname = Arc::clone(&hostname);
        async move { redirect_to_https(&hostname, &uri) }
    })
}

fn redirect_to_https(hostname: &str, uri: &Uri) -> Response {
    let location = https_location(hostname, uri);
    tracing::debug!(from = %uri, to = %location, "Redirecting HTTP to HTTPS");
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// Builds the HTTPS target, copying path and raw query without re-encoding.
fn https_location(hostname: &str, uri: &Uri) -> String {
    match uri.query() {
        Some(query) if !query.is_empty() => format!("https://{}{}?{}", hostname, uri.path(), query),
        _ => format!("https://{}{}", hostname, uri.path()),
    }
}
