use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Probe the session store and describe the daemon's current state.
///
/// A failed probe is only logged here; switching to degraded mode is left to the
/// storage supervisor.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_reachable = match state.session_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "session store health check failed");
                false
            }
        },
        None => false,
    };

    let status = if state.is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    let local = state.local().await;
    HealthResponse {
        status,
        store_reachable,
        uid: state.identity().uid.clone(),
        view: local.tracker.view(),
        lobby_id: local.lobby_id.clone(),
    }
}
