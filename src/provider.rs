//! Seam between the server and the overlay network stack.
//!
//! The server never talks to the network directly. Everything it needs from
//! the overlay (joining, listeners, status, peer identity) goes through
//! [`OverlayProvider`] and the [`IdentityClient`] it hands out, so the
//! lifecycle logic can be driven by a scripted provider in tests.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::BoxError;
use serde::Serialize;

/// A node handle on the overlay network.
///
/// Timeouts are applied by the caller; implementations may block for as long
/// as the underlying operation takes.
#[async_trait]
pub trait OverlayProvider: Send + Sync + 'static {
    type Listener: Send + 'static;

    /// Attempts to bring the node up. `Ok(None)` means the node answered
    /// without a status and the attempt should be repeated.
    async fn up(&self) -> Result<Option<NodeStatus>, BoxError>;

    /// Returns a client for the node's local control API.
    fn local_client(&self) -> Result<Arc<dyn IdentityClient>, BoxError>;

    /// Opens a TLS listener on the overlay network.
    async fn listen_tls(&self, network: &str, addr: &str) -> Result<Self::Listener, BoxError>;

    /// Opens a plaintext listener on the overlay network.
    async fn listen(&self, network: &str, addr: &str) -> Result<Self::Listener, BoxError>;

    /// Tears the node down.
    async fn close(&self) -> Result<(), BoxError>;
}

/// Queries against the node's local control API.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn status(&self) -> Result<NodeStatus, BoxError>;

    /// Resolves the peer behind a connection's remote address.
    async fn who_is(&self, remote_addr: SocketAddr) -> Result<WhoIs, BoxError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub backend_state: String,
    pub self_node: SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfNode {
    /// Absolute DNS name, usually with a trailing dot
    pub dns_name: String,
    pub host_name: String,
    pub addresses: Vec<IpAddr>,
}

/// Identity bound to a remote address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoIs {
    pub node: NodeInfo,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub login_name: String,
    pub display_name: String,
}
