use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dto::{
        lobby::{LobbySummary, QuestionSummary},
        sse::{
            CloseReason, ErrorEvent, LobbyClosedEvent, ServerEvent, SystemStatus,
            ViewChangedEvent,
        },
    },
    services::history_service::FinishReport,
    state::{SharedState, lobby::Lobby, session::AnswerOutcome, view::Reconciliation},
};

const EVENT_SYSTEM_STATUS: &str = "system_status";
const EVENT_VIEW_CHANGED: &str = "view.changed";
const EVENT_LOBBY_UPDATED: &str = "lobby.updated";
const EVENT_LOBBY_CLOSED: &str = "lobby.closed";
const EVENT_QUESTION_PREPARED: &str = "question.prepared";
const EVENT_ANSWER_RECORDED: &str = "answer.recorded";
const EVENT_GAME_FINISHED: &str = "game.finished";
const EVENT_ERROR: &str = "error";

/// Broadcast whether the session store is reachable.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Broadcast a view change, if the reconciliation produced one.
pub fn broadcast_view_change(
    state: &SharedState,
    reconciliation: &Reconciliation,
    lobby_id: Option<&str>,
) {
    if !reconciliation.view_changed() {
        return;
    }
    let payload = ViewChangedEvent {
        view: reconciliation.current,
        previous: reconciliation.previous,
        lobby_id: lobby_id.map(str::to_owned),
    };
    send_event(state, EVENT_VIEW_CHANGED, &payload);
}

/// Broadcast the latest shared lobby state.
pub fn broadcast_lobby(state: &SharedState, lobby: &Lobby) {
    send_event(state, EVENT_LOBBY_UPDATED, &LobbySummary::from(lobby));
}

/// Broadcast that the client is no longer in `lobby_id`.
pub fn broadcast_lobby_closed(state: &SharedState, lobby_id: &str, reason: CloseReason) {
    let payload = LobbyClosedEvent {
        lobby_id: lobby_id.to_owned(),
        reason,
    };
    send_event(state, EVENT_LOBBY_CLOSED, &payload);
}

/// Broadcast a freshly prepared question.
pub fn broadcast_question(state: &SharedState, question: &QuestionSummary) {
    send_event(state, EVENT_QUESTION_PREPARED, question);
}

/// Broadcast this client's recorded answer.
pub fn broadcast_answer(state: &SharedState, outcome: &AnswerOutcome) {
    send_event(state, EVENT_ANSWER_RECORDED, outcome);
}

/// Broadcast the outcome of the finish routine.
pub fn broadcast_game_finished(state: &SharedState, report: &FinishReport) {
    send_event(state, EVENT_GAME_FINISHED, report);
}

/// Broadcast a transient error message.
pub fn broadcast_error(state: &SharedState, message: impl Into<String>) {
    let payload = ErrorEvent {
        message: message.into(),
    };
    send_event(state, EVENT_ERROR, &payload);
}

fn send_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_owned()), payload) {
        Ok(message) => {
            if state.sse().broadcast(message) == 0 {
                debug!(event, "no UI stream connected; event dropped");
            }
        }
        Err(err) => warn!(event, error = %err, "failed to serialise SSE payload"),
    }
}
