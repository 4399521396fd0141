//! tailserve: HTTPS endpoints on a private overlay network.
//!
//! A [`Server`] joins the overlay, resolves its fully-qualified name, and
//! provisions TLS listeners. Routers served on them should be wrapped with
//! [`http::with_hsts`]; when port 443 is requested, a plaintext listener with
//! a redirect handler comes along.

pub mod config;
pub mod dnsname;
pub mod error;
pub mod http;
pub mod local;
pub mod middleware;
pub mod provider;
pub mod retry;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::ServerError;
pub use provider::{IdentityClient, OverlayProvider};
pub use retry::BringUpPolicy;
pub use server::{Identity, Listeners, RedirectListener, Server};
