//! Local overlay provider.
//!
//! Serves on the host's own interfaces instead of a private overlay, for
//! development and for hosts that already sit on a trusted network:
//! - Listeners are plain tokio sockets bound to `[local] bind_host`
//! - TLS uses the PEM certificate and key from `[local]`
//! - Caller identities come from the static `[[local.peers]]` table

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use axum::BoxError;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Timeout;
use tokio_rustls::server::TlsStream;
use tokio_rustls::{Accept, TlsAcceptor};

use crate::config::{LocalConfig, LocalPeer, ServerConfig, PROTOCOL};
use crate::provider::{
    IdentityClient, NodeInfo, NodeStatus, OverlayProvider, SelfNode, UserProfile, WhoIs,
};

/// Upper bound for a single TLS handshake, counted from accept
const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

pub struct LocalProvider {
    node: ServerConfig,
    settings: LocalConfig,
    client: Arc<LocalClient>,
    closed: AtomicBool,
}

impl LocalProvider {
    pub fn new(node: ServerConfig, settings: LocalConfig) -> Self {
        let status = NodeStatus {
            backend_state: "Running".to_string(),
            self_node: SelfNode {
                dns_name: dns_name(&node.hostname, settings.domain.as_deref()),
                host_name: node.hostname.clone(),
                addresses: vec![settings.bind_host],
            },
        };
        let client = Arc::new(LocalClient {
            status,
            peers: settings.peers.clone(),
        });

        Self {
            node,
            settings,
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Resolves a provider address (`":443"` or `"host:port"`) to a bind address.
    fn bind_addr(&self, network: &str, addr: &str) -> Result<SocketAddr, BoxError> {
        if network != PROTOCOL {
            return Err(format!("unsupported network {:?}", network).into());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err("local node is closed".into());
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in address {:?}", addr))?;
        let port: u16 = port.parse()?;
        let ip: IpAddr = if host.is_empty() {
            self.settings.bind_host
        } else {
            host.trim_start_matches('[').trim_end_matches(']').parse()?
        };

        Ok(SocketAddr::new(ip, port))
    }

    fn tls_acceptor(&self) -> Result<TlsAcceptor, BoxError> {
        match (&self.settings.cert_path, &self.settings.key_path) {
            (Some(cert_path), Some(key_path)) => load_tls_acceptor(cert_path, key_path),
            _ => Err("TLS requires [local] cert_path and key_path".into()),
        }
    }
}

#[async_trait]
impl OverlayProvider for LocalProvider {
    type Listener = LocalListener;

    async fn up(&self) -> Result<Option<NodeStatus>, BoxError> {
        tokio::fs::create_dir_all(&self.node.state_dir).await?;
        Ok(Some(self.client.status.clone()))
    }

    fn local_client(&self) -> Result<Arc<dyn IdentityClient>, BoxError> {
        Ok(self.client.clone())
    }

    async fn listen_tls(&self, network: &str, addr: &str) -> Result<LocalListener, BoxError> {
        let bind = self.bind_addr(network, addr)?;
        let acceptor = self.tls_acceptor()?;
        let tcp = TcpListener::bind(bind).await?;
        tracing::info!(addr = %tcp.local_addr()?, "Listening (TLS)");
        Ok(LocalListener::Tls { tcp, acceptor })
    }

    async fn listen(&self, network: &str, addr: &str) -> Result<LocalListener, BoxError> {
        let bind = self.bind_addr(network, addr)?;
        let tcp = TcpListener::bind(bind).await?;
        tracing::info!(addr = %tcp.local_addr()?, "Listening");
        Ok(LocalListener::Plain(tcp))
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.closed.store(true, Ordering::Release);
        tracing::info!(hostname = %self.node.hostname, "Local node closed");
        Ok(())
    }
}

fn dns_name(hostname: &str, domain: Option<&str>) -> String {
    match domain.map(|d| d.trim_matches('.')).filter(|d| !d.is_empty()) {
        Some(domain) => format!("{}.{}.", hostname, domain),
        None => format!("{}.", hostname),
    }
}

fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, BoxError> {
    let certs = CertificateDer::pem_file_iter(cert_path)?.collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(format!("no certificates found in {}", cert_path.display()).into());
    }
    let key = PrivateKeyDer::from_pem_file(key_path)?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Identity and status answers for the local node.
struct LocalClient {
    status: NodeStatus,
    peers: Vec<LocalPeer>,
}

#[async_trait]
impl IdentityClient for LocalClient {
    async fn status(&self) -> Result<NodeStatus, BoxError> {
        Ok(self.status.clone())
    }

    async fn who_is(&self, remote_addr: SocketAddr) -> Result<WhoIs, BoxError> {
        let ip = remote_addr.ip().to_canonical();
        let peer = self
            .peers
            .iter()
            .find(|peer| peer.ip == ip)
            .ok_or_else(|| format!("no peer known for {}", remote_addr))?;

        Ok(WhoIs {
            node: NodeInfo {
                name: peer.node_name.clone(),
                addresses: vec![peer.ip],
            },
            user: UserProfile {
                login_name: peer.login_name.clone(),
                display_name: if peer.display_name.is_empty() {
                    peer.login_name.clone()
                } else {
                    peer.display_name.clone()
                },
            },
        })
    }
}

/// A listener opened by [`LocalProvider`].
pub enum LocalListener {
    /// Plain TCP listener
    Plain(TcpListener),
    /// TCP listener whose connections are TLS-terminated by the connection task
    Tls { tcp: TcpListener, acceptor: TlsAcceptor },
}

impl axum::serve::Listener for LocalListener {
    type Io = LocalStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self {
            LocalListener::Plain(tcp) => {
                let (stream, addr) = axum::serve::Listener::accept(tcp).await;
                (LocalStream::Plain(stream), addr)
            }
            LocalListener::Tls { tcp, acceptor } => {
                let (stream, addr) = axum::serve::Listener::accept(tcp).await;
                let handshake = tokio::time::timeout(
                    Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
                    acceptor.accept(stream),
                );
                (LocalStream::Tls(TlsConnection::new(handshake, addr)), addr)
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        match self {
            LocalListener::Plain(tcp) | LocalListener::Tls { tcp, .. } => tcp.local_addr(),
        }
    }
}

/// Connection info for routers served from a [`LocalListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl Connected<IncomingStream<'_, LocalListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, LocalListener>) -> Self {
        PeerAddr(*stream.remote_addr())
    }
}

/// A stream that can be either TLS-encrypted or plain TCP
pub enum LocalStream {
    Plain(TcpStream),
    Tls(TlsConnection),
}

/// Server side of a TLS connection.
///
/// The handshake is driven by the first read or write, so it runs on the
/// task serving the connection rather than in the accept loop.
pub struct TlsConnection {
    peer: SocketAddr,
    state: TlsState,
}

enum TlsState {
    Handshaking(Pin<Box<Timeout<Accept<TcpStream>>>>),
    Ready(Box<TlsStream<TcpStream>>),
    Failed,
}

impl TlsConnection {
    fn new(handshake: Timeout<Accept<TcpStream>>, peer: SocketAddr) -> Self {
        Self {
            peer,
            state: TlsState::Handshaking(Box::pin(handshake)),
        }
    }

    fn poll_stream(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<&mut TlsStream<TcpStream>>> {
        if let TlsState::Handshaking(handshake) = &mut self.state {
            let stream = match ready!(handshake.as_mut().poll(cx)) {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(peer = %self.peer, error = %e, "TLS handshake failed");
                    self.state = TlsState::Failed;
                    return Poll::Ready(Err(e));
                }
                Err(_) => {
                    tracing::debug!(peer = %self.peer, "TLS handshake timed out");
                    self.state = TlsState::Failed;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "TLS handshake timed out",
                    )));
                }
            };
            self.state = TlsState::Ready(Box::new(stream));
        }

        match &mut self.state {
            TlsState::Ready(stream) => Poll::Ready(Ok(stream.as_mut())),
            _ => Poll::Ready(Err(io::ErrorKind::NotConnected.into())),
        }
    }
}

impl AsyncRead for LocalStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            LocalStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            LocalStream::Tls(conn) => Pin::new(ready!(conn.poll_stream(cx))?).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            LocalStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            LocalStream::Tls(conn) => Pin::new(ready!(conn.poll_stream(cx))?).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            LocalStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            LocalStream::Tls(conn) => Pin::new(ready!(conn.poll_stream(cx))?).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            LocalStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            // Nothing to close cleanly on a connection that never finished its handshake
            LocalStream::Tls(TlsConnection {
                state: TlsState::Handshaking(_) | TlsState::Failed,
                ..
            }) => Poll::Ready(Ok(())),
            LocalStream::Tls(conn) => Pin::new(ready!(conn.poll_stream(cx))?).poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            LocalStream::Plain(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
            LocalStream::Tls(conn) => {
                Pin::new(ready!(conn.poll_stream(cx))?).poll_write_vectored(cx, bufs)
            }
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            LocalStream::Plain(stream) => stream.is_write_vectored(),
            LocalStream::Tls(_) => true,
        }
    }
}
