//! Caller identity endpoint.

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::Serialize;

use crate::error::ServerError;
use crate::local::PeerAddr;
use crate::provider::WhoIs;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    /// Name this service is published under
    pub served_by: String,
    #[serde(flatten)]
    pub caller: WhoIs,
}

/// Reports the overlay identity of the caller. Lookup failures become a 500
/// for this request only.
pub async fn whoami(
    State(state): State<AppState>,
    ConnectInfo(PeerAddr(remote_addr)): ConnectInfo<PeerAddr>,
) -> Result<Json<WhoAmI>, ServerError> {
    let caller = state.identity.caller_identity(remote_addr).await?;
    tracing::debug!(login = %caller.user.login_name, node = %caller.node.name, "Resolved caller");

    Ok(Json(WhoAmI {
        served_by: state.fqdn.to_string(),
        caller,
    }))
}
