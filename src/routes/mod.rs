//! Application routes served on the TLS listeners.
//!
//! Every route is wrapped with the HSTS layer, and the request ID middleware
//! is the outermost layer so its span covers the HSTS decision too.

pub mod health;
pub mod whoami;

use axum::{middleware, routing::get, Router};

use crate::http::with_hsts;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/whoami", get(whoami::whoami))
        .with_state(state);

    with_hsts(app).layer(middleware::from_fn(request_id_layer))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::header::{HOST, STRICT_TRANSPORT_SECURITY};
    use axum::http::{Request, StatusCode};
    use axum::BoxError;
    use tower::ServiceExt;

    use super::*;
    use crate::local::PeerAddr;
    use crate::provider::{IdentityClient, NodeInfo, NodeStatus, SelfNode, UserProfile, WhoIs};
    use crate::server::Identity;

    struct OnePeer {
        addr: SocketAddr,
    }

    #[async_trait]
    impl IdentityClient for OnePeer {
        async fn status(&self) -> Result<NodeStatus, BoxError> {
            Ok(NodeStatus {
                backend_state: "Running".to_string(),
                self_node: SelfNode {
                    dns_name: "svc.example.ts.net.".to_string(),
                    host_name: "svc".to_string(),
                    addresses: vec![],
                },
            })
        }

        async fn who_is(&self, remote_addr: SocketAddr) -> Result<WhoIs, BoxError> {
            if remote_addr != self.addr {
                return Err("unknown peer".into());
            }
            Ok(WhoIs {
                node: NodeInfo {
                    name: "laptop".to_string(),
                    addresses: vec![remote_addr.ip()],
                },
                user: UserProfile {
                    login_name: "alice@example.com".to_string(),
                    display_name: "Alice".to_string(),
                },
            })
        }
    }

    fn known_peer() -> SocketAddr {
        "100.64.0.2:41000".parse().unwrap()
    }

    fn app(caller: SocketAddr) -> Router {
        let identity = Identity::new(Arc::new(OnePeer { addr: known_peer() }));
        create_router(AppState::new(identity, "svc.example.ts.net"))
            .layer(MockConnectInfo(PeerAddr(caller)))
    }

    fn request(uri: &str, host: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_with_fqdn_host_sets_hsts() {
        let response = app(known_peer())
            .oneshot(request("/health", "svc.example.ts.net"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STRICT_TRANSPORT_SECURITY], "max-age=31536000");
    }

    #[tokio::test]
    async fn test_health_with_bare_host_has_no_hsts() {
        let response = app(known_peer()).oneshot(request("/health", "svc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_whoami_known_caller() {
        let response = app(known_peer()).oneshot(request("/whoami", "svc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["served_by"], "svc.example.ts.net");
        assert_eq!(json["user"]["login_name"], "alice@example.com");
        assert_eq!(json["node"]["name"], "laptop");
    }

    #[tokio::test]
    async fn test_whoami_lookup_failure_is_500() {
        let stranger: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let response = app(stranger).oneshot(request("/whoami", "svc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
