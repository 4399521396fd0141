//! HTTP policy and serving.
//!
//! This module provides:
//! - **HSTS**: `Strict-Transport-Security` for fully-qualified `Host` headers
//! - **Redirect**: plaintext requests answered with a 302 to the canonical HTTPS URL
//! - **Serving**: running routers on provisioned listeners until SIGTERM/SIGINT

mod hsts;
mod redirect;
mod server;
mod shutdown;

pub use hsts::{declares_fqdn, first_header_value, hsts_layer, with_hsts};
pub use redirect::redirect_router;
pub use server::{serve, ServeError};
