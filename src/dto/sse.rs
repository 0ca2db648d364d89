use serde::Serialize;
use utoipa::ToSchema;

use crate::state::view::View;

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    /// Event name, if any.
    pub event: Option<String>,
    /// Serialised payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Uid of the player this daemon acts for.
    pub uid: String,
    /// Current view.
    pub view: View,
    /// Whether the daemon is running without a session store connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the daemon enters or leaves degraded mode.
pub struct SystemStatus {
    /// Whether the session store is unreachable.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the derived view changes.
pub struct ViewChangedEvent {
    /// New view.
    pub view: View,
    /// View that was left.
    pub previous: View,
    /// Lobby the view belongs to.
    pub lobby_id: Option<String>,
}

/// Why the client left its lobby without asking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client left on purpose.
    Left,
    /// The lobby document was deleted.
    Deleted,
    /// The host was no longer a member.
    HostAbsent,
    /// The client was no longer listed as a member.
    Removed,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the client is no longer in a lobby.
pub struct LobbyClosedEvent {
    /// Lobby that was left.
    pub lobby_id: String,
    /// Why it was left.
    pub reason: CloseReason,
}

#[derive(Debug, Serialize, ToSchema)]
/// Transient, dismissible error scoped to the current view.
pub struct ErrorEvent {
    /// Human-readable description.
    pub message: String,
}
