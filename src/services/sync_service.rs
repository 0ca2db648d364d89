//! Subscription handler: folds every pushed lobby document into local view state.

use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::session_store::{DocumentStream, LOBBY_COLLECTION},
    dto::{lobby::QuestionSummary, sse::CloseReason},
    error::ServiceError,
    services::{
        countdown::TaskGuard,
        lobby_service,
        playback::PlaybackRequest,
        scheduler, sse_events,
    },
    state::{
        LocalLobby, SharedState,
        lobby::Lobby,
        lobby_machine::{self, LobbyEvent, LobbyStatus},
        session::{ActiveQuestion, AnswerState},
        view::View,
    },
};

const INITIAL_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(10);

/// What the subscription loop does after one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Keep listening.
    Continue,
    /// The client is no longer in the lobby.
    Closed,
}

/// Consume the document stream of `lobby_id` until the client leaves it.
///
/// Handler errors are logged and surfaced to the UI without ending the loop. A
/// stream that ends while the client is still in the lobby is re-opened with
/// exponential backoff.
pub async fn run_subscription(state: SharedState, lobby_id: String, mut stream: DocumentStream) {
    let mut delay = INITIAL_RESUBSCRIBE_DELAY;

    loop {
        while let Some(item) = stream.next().await {
            match item {
                Ok(document) => {
                    delay = INITIAL_RESUBSCRIBE_DELAY;
                    match apply_snapshot(&state, &lobby_id, document).await {
                        Ok(SnapshotOutcome::Continue) => {}
                        Ok(SnapshotOutcome::Closed) => return,
                        Err(err) => {
                            warn!(lobby_id = %lobby_id, error = %err, "failed to apply lobby update");
                            sse_events::broadcast_error(&state, err.to_string());
                        }
                    }
                }
                Err(err) => {
                    warn!(lobby_id = %lobby_id, error = %err, "lobby subscription error");
                    sse_events::broadcast_error(&state, err.to_string());
                }
            }
        }

        if !state.local().await.is_in(&lobby_id) {
            return;
        }
        warn!(lobby_id = %lobby_id, delay_ms = delay.as_millis() as u64, "lobby subscription ended; resubscribing");
        sleep(delay).await;
        delay = (delay * 2).min(MAX_RESUBSCRIBE_DELAY);

        match state.require_session_store().await {
            Ok(store) => match store.subscribe_document(LOBBY_COLLECTION, &lobby_id).await {
                Ok(next) => stream = next,
                Err(err) => warn!(lobby_id = %lobby_id, error = %err, "resubscribe failed"),
            },
            Err(err) => debug!(lobby_id = %lobby_id, error = %err, "no session store to resubscribe to"),
        }
    }
}

/// Reconcile local state with one observed document of `lobby_id`.
///
/// `None` means the document was deleted.
pub async fn apply_snapshot(
    state: &SharedState,
    lobby_id: &str,
    document: Option<Value>,
) -> Result<SnapshotOutcome, ServiceError> {
    let Some(document) = document else {
        info!(lobby_id = %lobby_id, "lobby deleted");
        close(state, lobby_id, CloseReason::Deleted).await;
        return Ok(SnapshotOutcome::Closed);
    };
    let lobby = Lobby::from_document(lobby_id, document)?;
    let uid = state.identity().uid.clone();

    if lobby_machine::plan(&lobby, &uid, LobbyEvent::HostAbsent).is_ok() {
        warn!(lobby_id = %lobby_id, host_id = %lobby.host_id, "host absent; deleting lobby");
        match state.require_session_store().await {
            Ok(store) => {
                if let Err(err) = store.delete_document(LOBBY_COLLECTION, lobby_id).await {
                    warn!(lobby_id = %lobby_id, error = %err, "failed to delete orphaned lobby");
                }
            }
            Err(err) => warn!(lobby_id = %lobby_id, error = %err, "cannot delete orphaned lobby"),
        }
        close(state, lobby_id, CloseReason::HostAbsent).await;
        return Ok(SnapshotOutcome::Closed);
    }
    if lobby.player(&uid).is_none() {
        info!(lobby_id = %lobby_id, "no longer listed as a member");
        close(state, lobby_id, CloseReason::Removed).await;
        return Ok(SnapshotOutcome::Closed);
    }

    let is_host = lobby.is_host(&uid);
    let config = state.config();
    let (reconciliation, prepared, advance) = {
        let mut local = state.local().await;
        if !local.is_in(lobby_id) {
            return Ok(SnapshotOutcome::Closed);
        }

        let reconciliation = local
            .tracker
            .observe(Some(lobby.status), lobby.current_track_index);
        if reconciliation.left_playing() {
            local.clear_question();
        }
        if reconciliation.current == View::Playing && reconciliation.previous != View::Playing {
            local.used_decoys.clear();
            local.advance_scheduled = None;
        }

        let prepared = match reconciliation.prepare {
            Some(index) => prepare_question(state, &mut local, &lobby, &uid, index),
            None => None,
        };

        let index = lobby.current_track_index;
        let advance = is_host
            && config.auto_advance
            && lobby.status == LobbyStatus::Playing
            && lobby.all_answered_current()
            && local.advance_scheduled != Some(index);
        if advance {
            local.advance_scheduled = Some(index);
        }

        local.snapshot = Some(lobby.clone());
        (reconciliation, prepared, advance.then_some(index))
    };

    sse_events::broadcast_view_change(state, &reconciliation, Some(lobby_id));
    sse_events::broadcast_lobby(state, &lobby);

    if reconciliation.left_playing()
        && let Err(err) = state.playback().pause().await
    {
        warn!(lobby_id = %lobby_id, error = %err, "failed to pause playback");
    }

    if let Some(prepared) = prepared {
        start_playback(state, &lobby, &prepared).await;
        sse_events::broadcast_question(state, &prepared.summary);
    }

    if let Some(index) = advance {
        schedule_advance(state, index);
    }

    Ok(SnapshotOutcome::Continue)
}

/// Question prepared while the local lock was held.
struct PreparedQuestion {
    summary: QuestionSummary,
    track_index: usize,
}

fn prepare_question(
    state: &SharedState,
    local: &mut LocalLobby,
    lobby: &Lobby,
    uid: &str,
    index: usize,
) -> Option<PreparedQuestion> {
    let Some(track) = lobby.tracks.get(index) else {
        warn!(lobby_id = %lobby.id, index, "question index out of range");
        local.clear_question();
        return None;
    };
    let config = state.config();

    let options = scheduler::choose_distractors(
        track,
        &lobby.distractor_pool(),
        &local.used_decoys,
        config.option_count,
    );
    local.used_decoys.extend(
        options
            .iter()
            .filter(|option| **option != track.name)
            .cloned(),
    );

    let window = config.question_time;
    let window_ms = config.question_time_ms();
    let answer = match lobby
        .player(uid)
        .and_then(|player| player.answers.get(index))
    {
        Some(recorded) => {
            AnswerState::Answered(lobby_service::recorded_outcome(index, recorded, window_ms))
        }
        None => AnswerState::Open,
    };

    let question = ActiveQuestion {
        index,
        track: track.clone(),
        options,
        start_offset_ms: lobby.start_offset(index),
        started_at: Instant::now(),
        window,
        answer,
    };
    let summary = QuestionSummary::new(&question, lobby.total_questions());
    local.question = Some(question);
    local.countdown = Some(start_countdown(state, index, window, lobby.is_host(uid)));
    debug!(lobby_id = %lobby.id, index, "question prepared");

    Some(PreparedQuestion {
        summary,
        track_index: index,
    })
}

/// Local answer countdown; the host also times out silent members afterwards.
fn start_countdown(state: &SharedState, index: usize, window: Duration, is_host: bool) -> TaskGuard {
    let state = state.clone();
    TaskGuard::after(window, async move {
        if let Err(err) = lobby_service::handle_timeout(&state, index).await {
            warn!(index, error = %err, "failed to record timeout");
            sse_events::broadcast_error(&state, err.to_string());
        }
        if !is_host {
            return;
        }
        sleep(state.config().straggler_grace).await;
        match lobby_service::enforce_stragglers(&state, index).await {
            Ok(0) => {}
            Ok(count) => info!(index, count, "silent players timed out"),
            Err(err) => warn!(index, error = %err, "failed to time out silent players"),
        }
    })
}

async fn start_playback(state: &SharedState, lobby: &Lobby, prepared: &PreparedQuestion) {
    let Some(track) = lobby.tracks.get(prepared.track_index) else {
        return;
    };
    let Some(request) =
        PlaybackRequest::for_track(lobby.playback_mode, track, prepared.summary.start_offset_ms)
    else {
        warn!(lobby_id = %lobby.id, track_id = %track.id, "track has nothing to play");
        sse_events::broadcast_error(state, "this track cannot be played");
        return;
    };
    if let Err(err) = state.playback().play(request).await {
        warn!(lobby_id = %lobby.id, error = %err, "failed to start playback");
        sse_events::broadcast_error(state, err.to_string());
    }
}

/// Advance after the reveal delay; detached so later snapshots cannot cancel it.
fn schedule_advance(state: &SharedState, index: usize) {
    let state = state.clone();
    let delay = state.config().reveal_delay;
    debug!(index, delay_ms = delay.as_millis() as u64, "auto-advance scheduled");
    tokio::spawn(async move {
        sleep(delay).await;
        match lobby_service::auto_advance(&state, index).await {
            Ok(_) => {}
            Err(ServiceError::NoActiveLobby) => {}
            Err(err) => {
                warn!(index, error = %err, "auto-advance failed");
                sse_events::broadcast_error(&state, err.to_string());
            }
        }
    });
}

async fn close(state: &SharedState, lobby_id: &str, reason: CloseReason) {
    if let Some(subscription) = lobby_service::close_local(state, lobby_id, reason).await {
        subscription.detach();
    }
}
