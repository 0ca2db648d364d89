use serde::Serialize;
use utoipa::ToSchema;

use crate::state::view::View;

/// Overall daemon status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session store connected and answering.
    Ok,
    /// Running without a usable session store; lobby intents are refused.
    Degraded,
}

/// Payload of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Whether the session store answered the probe made for this request.
    pub store_reachable: bool,
    /// Player this daemon acts for.
    pub uid: String,
    /// Screen the UI should currently show.
    pub view: View,
    /// Joined lobby, if any.
    pub lobby_id: Option<String>,
}
