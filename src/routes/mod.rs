use axum::Router;

use crate::state::SharedState;

/// Swagger UI.
pub mod docs;
/// Liveness and storage status.
pub mod health;
/// Profiles ranked by total score.
pub mod leaderboard;
/// Lobby intents and the lobby browser.
pub mod lobby;
/// Notifications from the UI's audio player.
pub mod playback;
/// Server-sent event stream.
pub mod sse;

/// Compose all route trees and bind them to the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(lobby::router())
        .merge(leaderboard::router())
        .merge(playback::router())
        .merge(docs::router())
        .with_state(state)
}
