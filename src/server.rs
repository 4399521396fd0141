//! Overlay server lifecycle.
//!
//! [`Server::new`] validates the configuration, brings the node up on the
//! overlay network, and resolves the node's fully-qualified name. Once it
//! returns, the server is read-only and can be shared freely; [`Server::listen`]
//! provisions TLS listeners plus the HTTP->HTTPS redirect listener when the
//! canonical HTTPS port is requested.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::time::timeout;

use crate::config::{ServerConfig, HTTPS_PORT, HTTP_ADDRESS, PROTOCOL};
use crate::error::{ListenerKind, ServerError};
use crate::http::redirect_router;
use crate::provider::{IdentityClient, NodeStatus, OverlayProvider, WhoIs};
use crate::retry::BringUpPolicy;

/// A node on the overlay network, ready to provision listeners.
pub struct Server<P: OverlayProvider> {
    provider: Option<P>,
    identity: Identity,
    fqdn: String,
}

/// Cloneable handle for resolving the identity behind a connection.
#[derive(Clone)]
pub struct Identity {
    client: Arc<dyn IdentityClient>,
}

impl Identity {
    pub fn new(client: Arc<dyn IdentityClient>) -> Self {
        Self { client }
    }

    /// Looks up the overlay identity bound to `remote_addr`.
    pub async fn caller_identity(&self, remote_addr: SocketAddr) -> Result<WhoIs, ServerError> {
        self.client
            .who_is(remote_addr)
            .await
            .map_err(ServerError::IdentityLookup)
    }
}

/// Plaintext listener paired with the handler that redirects it to HTTPS.
pub struct RedirectListener<L> {
    pub listener: L,
    pub handler: Router,
}

/// Listeners opened by [`Server::listen`].
pub struct Listeners<L> {
    /// One TLS listener per requested port, in request order
    pub tls: Vec<L>,
    /// Present iff the canonical HTTPS port was requested
    pub redirect: Option<RedirectListener<L>>,
}

impl<L> Listeners<L> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            tls: Vec::with_capacity(capacity),
            redirect: None,
        }
    }

    /// Total number of open listeners, including the redirect listener.
    pub fn len(&self) -> usize {
        self.tls.len() + usize::from(self.redirect.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: OverlayProvider> Server<P> {
    /// Creates a server, retrying bring-up until the node answers.
    ///
    /// `connect` builds the provider handle from the validated configuration.
    /// With the default policy this never gives up on bring-up; use
    /// [`Server::with_policy`] to bound it.
    pub async fn new<F>(config: ServerConfig, connect: F) -> Result<Self, ServerError>
    where
        F: FnOnce(ServerConfig) -> P,
    {
        Self::with_policy(config, BringUpPolicy::default(), connect).await
    }

    pub async fn with_policy<F>(
        config: ServerConfig,
        policy: BringUpPolicy,
        connect: F,
    ) -> Result<Self, ServerError>
    where
        F: FnOnce(ServerConfig) -> P,
    {
        config.validate()?;

        let hostname = config.hostname.clone();
        let provider = connect(config);

        let status = bring_up(&provider, &policy).await?;
        tracing::debug!(
            hostname = %hostname,
            backend_state = %status.backend_state,
            "Overlay node is up"
        );

        let client = provider.local_client().map_err(ServerError::ClientInit)?;

        let status = timeout(policy.status_timeout, client.status())
            .await
            .map_err(|elapsed| ServerError::StatusQuery(Box::new(elapsed)))?
            .map_err(ServerError::StatusQuery)?;

        let dns_name = status.self_node.dns_name.as_str();
        let fqdn = dns_name.strip_suffix('.').unwrap_or(dns_name).to_string();
        tracing::info!("this service will be available on [{}]", fqdn);

        Ok(Self {
            provider: Some(provider),
            identity: Identity { client },
            fqdn,
        })
    }

    /// Opens a TLS listener for each port in `https_ports`.
    ///
    /// When [`HTTPS_PORT`] is among them, a plaintext listener on
    /// [`HTTP_ADDRESS`] and its redirect handler are opened too. If any listener
    /// fails, those already opened by this call are dropped before returning.
    pub async fn listen(&self, https_ports: &[u16]) -> Result<Listeners<P::Listener>, ServerError> {
        let provider = self.provider()?;
        let mut listeners = Listeners::with_capacity(https_ports.len());

        for &port in https_ports {
            let addr = format!(":{}", port);
            let listener = provider
                .listen_tls(PROTOCOL, &addr)
                .await
                .map_err(|source| listen_failed(&listeners, addr.clone(), ListenerKind::Tls, source))?;
            tracing::debug!(addr = %addr, "Opened TLS listener");
            listeners.tls.push(listener);

            if port == HTTPS_PORT && listeners.redirect.is_none() {
                let listener = provider
                    .listen(PROTOCOL, HTTP_ADDRESS)
                    .await
                    .map_err(|source| {
                        listen_failed(&listeners, HTTP_ADDRESS.to_string(), ListenerKind::Plain, source)
                    })?;
                tracing::debug!(addr = HTTP_ADDRESS, "Opened HTTP redirect listener");
                listeners.redirect = Some(RedirectListener {
                    listener,
                    handler: redirect_router(self.fqdn.as_str()),
                });
            }
        }

        Ok(listeners)
    }

    /// Resolves the overlay identity behind `remote_addr`.
    pub async fn get_caller_identity(&self, remote_addr: SocketAddr) -> Result<WhoIs, ServerError> {
        self.identity.caller_identity(remote_addr).await
    }

    /// Handle for identity lookups that outlives borrows of the server.
    pub fn identity(&self) -> Identity {
        self.identity.clone()
    }

    /// Canonical name of this node, without the trailing dot.
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Shuts the node down. Provider errors are returned as-is.
    ///
    /// The provider is closed at most once: the handle is released on the
    /// first call, whatever its outcome, and later calls fail with
    /// [`ServerError::NotInitialized`] without reaching the provider. The same
    /// holds for [`Server::listen`] after close.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let provider = self.provider.take().ok_or(ServerError::NotInitialized)?;
        provider.close().await.map_err(ServerError::Close)
    }

    fn provider(&self) -> Result<&P, ServerError> {
        self.provider.as_ref().ok_or(ServerError::NotInitialized)
    }
}

fn listen_failed<L>(
    opened: &Listeners<L>,
    addr: String,
    kind: ListenerKind,
    source: axum::BoxError,
) -> ServerError {
    if !opened.is_empty() {
        tracing::debug!(count = opened.len(), "Releasing listeners after failed listen");
    }
    ServerError::Listen { addr, kind, source }
}

/// Retries [`OverlayProvider::up`] until it yields a status.
async fn bring_up<P: OverlayProvider>(
    provider: &P,
    policy: &BringUpPolicy,
) -> Result<NodeStatus, ServerError> {
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        match timeout(policy.attempt_timeout, provider.up()).await {
            Ok(Ok(Some(status))) => {
                tracing::debug!(attempts, "Overlay bring-up succeeded");
                return Ok(status);
            }
            Ok(Ok(None)) => {
                tracing::debug!(attempt = attempts, "Overlay node returned no status, retrying");
            }
            Ok(Err(e)) => {
                tracing::debug!(attempt = attempts, error = %e, "Overlay bring-up failed, retrying");
            }
            Err(_) => {
                tracing::debug!(
                    attempt = attempts,
                    timeout_ms = policy.attempt_timeout.as_millis() as u64,
                    "Overlay bring-up timed out, retrying"
                );
            }
        }

        if !policy.should_retry(attempts) {
            tracing::warn!(attempts, "Giving up on overlay bring-up");
            return Err(ServerError::BringUpExhausted { attempts });
        }

        // Immediate retry, but let other tasks run between attempts
        tokio::task::yield_now().await;
    }
}
