//! Strict-Transport-Security for fully-qualified origins.
//!
//! The header is only declared when the request's `Host` header names a
//! multi-label domain. Bare machine names (`http://svc/`) never get it, since a
//! browser would pin HTTPS for a name with no stable certificate behind it.

use axum::{
    extract::Request,
    http::{
        header::{HOST, STRICT_TRANSPORT_SECURITY},
        HeaderMap, HeaderName, HeaderValue,
    },
    middleware::{self, Next},
    response::Response,
    Router,
};

use crate::config;
use crate::dnsname::is_fully_qualified;

/// First value of header `name`. `None` when absent, which is distinct from a
/// present but empty value.
pub fn first_header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a HeaderValue> {
    headers.get(name)
}

/// Whether the `Host` header of a request names a fully-qualified domain.
///
/// Only the raw header is consulted, never the request target, so HTTP/2
/// requests carrying just `:authority` do not qualify.
pub fn declares_fqdn(headers: &HeaderMap) -> bool {
    first_header_value(headers, &HOST)
        .and_then(|value| value.to_str().ok())
        .map(is_fully_qualified)
        .unwrap_or(false)
}

/// Middleware that adds `Strict-Transport-Security` for fully-qualified hosts.
///
/// The request is always passed through; a header the inner handler already
/// set is left alone.
pub async fn hsts_layer(request: Request, next: Next) -> Response {
    let declare = declares_fqdn(request.headers());

    let mut response = next.run(request).await;

    if declare {
        response
            .headers_mut()
            .entry(STRICT_TRANSPORT_SECURITY)
            .or_insert(HeaderValue::from_static(config::STRICT_TRANSPORT_SECURITY));
    }

    response
}

/// Wraps `router` with [`hsts_layer`].
pub fn with_hsts<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn(hsts_layer))
}
