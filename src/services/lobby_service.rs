use std::sync::Arc;

use rand::{rng, seq::SliceRandom};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dao::{
        epoch_millis,
        models::{
            AnswerEntity, DecoyEntity, LOBBY_SCHEMA_VERSION, LobbyEntity, PlayerEntity,
            TIMEOUT_ANSWER, TrackEntity,
        },
        session_store::{
            DocumentQuery, DocumentUpdate, FieldPath, LOBBY_COLLECTION, SessionStore,
            SortDirection,
        },
        storage::StorageError,
    },
    dto::{
        format_epoch_millis,
        lobby::{
            AdvanceResponse, CreateLobbyRequest, JoinLobbyResponse, LeaderboardEntry,
            LobbyCreatedResponse, LobbyListing, LobbySummary, LocalStateResponse, QuestionSummary,
            ReadyResponse, SubmitAnswerResponse,
        },
        sse::CloseReason,
    },
    error::ServiceError,
    services::{
        countdown::TaskGuard,
        history_service::{self, FinishReport},
        scheduler, scoring, sse_events, sync_service,
    },
    state::{
        Identity, SharedState,
        lobby::{Answer, Lobby, PlaybackMode},
        lobby_machine::{self, LobbyEvent, LobbyStatus, TransitionError},
        session::{AnswerOutcome, AnswerState},
    },
};

/// Optimistic write attempts for joins racing other joins.
const MAX_JOIN_ATTEMPTS: usize = 3;

/// Playlist titles kept in a lobby for wrong options.
const MAX_DECOY_POOL: usize = 500;

/// Create a lobby from a playlist, join it as host and subscribe to it.
pub async fn create_lobby(
    state: &SharedState,
    request: CreateLobbyRequest,
) -> Result<LobbyCreatedResponse, ServiceError> {
    request.validate()?;
    ensure_not_in_lobby(state).await?;
    let store = state.require_session_store().await?;

    let catalog = state.catalog();
    let playlist = catalog.resolve_playlist(&request.playlist_url).await?;
    let include_unplayable = request.mode == PlaybackMode::Sdk;
    let mut tracks: Vec<_> = catalog
        .fetch_tracks(&playlist.id, include_unplayable)
        .await?
        .into_iter()
        .filter(|track| track.is_playable(request.mode))
        .collect();

    let required = state.config().min_playable_tracks;
    if tracks.len() < required {
        return Err(ServiceError::InsufficientTracks {
            available: tracks.len(),
            required,
        });
    }

    tracks.shuffle(&mut rng());
    let decoys: Vec<DecoyEntity> = tracks
        .iter()
        .take(MAX_DECOY_POOL)
        .map(|track| DecoyEntity {
            id: track.id.clone(),
            name: track.name.clone(),
            artists: track.artists.clone(),
        })
        .collect();
    tracks.truncate(request.question_count);

    let identity = state.identity();
    let entity = LobbyEntity {
        schema_version: LOBBY_SCHEMA_VERSION,
        host_id: identity.uid.clone(),
        players: vec![new_player(identity, true)],
        status: LobbyStatus::Waiting,
        total_questions: tracks.len(),
        tracks: tracks.iter().map(TrackEntity::from).collect(),
        decoys,
        current_track_index: 0,
        playback_mode: request.mode,
        start_positions: None,
        max_players: state.config().max_players,
        created_at: Some(epoch_millis()),
        started_at: None,
    };
    entity.validate()?;

    let id = store
        .create_document(LOBBY_COLLECTION, encode(&entity)?)
        .await?;
    info!(
        lobby_id = %id,
        playlist = %playlist.name,
        questions = entity.total_questions,
        mode = ?request.mode,
        "lobby created"
    );

    enter_lobby(state, store, &id).await?;
    Ok(LobbyCreatedResponse { id })
}

/// Join the lobby `id`, or re-subscribe to it when already a member.
pub async fn join_lobby(state: &SharedState, id: &str) -> Result<JoinLobbyResponse, ServiceError> {
    {
        let local = state.local().await;
        if local.is_in(id) {
            return Ok(JoinLobbyResponse {
                id: id.to_owned(),
                already_member: true,
            });
        }
        if let Some(current) = &local.lobby_id {
            return Err(ServiceError::AlreadyInLobby(current.clone()));
        }
    }

    let store = state.require_session_store().await?;
    let identity = state.identity();
    let mut already_member = false;

    for attempt in 1..=MAX_JOIN_ATTEMPTS {
        let lobby = fetch_lobby(store.as_ref(), id).await?;
        match lobby_machine::plan(&lobby, &identity.uid, LobbyEvent::Join) {
            Ok(_) => {}
            Err(TransitionError::AlreadyMember) => {
                already_member = true;
                break;
            }
            Err(err) => return Err(err.into()),
        }

        let update = DocumentUpdate::new()
            .append("players", encode(&new_player(identity, false))?)
            .guard_equals("status", status_value(LobbyStatus::Waiting))
            .guard_len("players", lobby.players.len());
        match store.update_document(LOBBY_COLLECTION, id, update).await {
            Ok(()) => break,
            Err(err) if err.is_precondition_failure() && attempt < MAX_JOIN_ATTEMPTS => {
                debug!(lobby_id = %id, attempt, "lobby changed during join; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(lobby_id = %id, uid = %identity.uid, already_member, "joined lobby");
    enter_lobby(state, store, id).await?;
    Ok(JoinLobbyResponse {
        id: id.to_owned(),
        already_member,
    })
}

/// Leave the current lobby; the host deletes it for everyone.
pub async fn leave_lobby(state: &SharedState) -> Result<(), ServiceError> {
    let lobby_id = current_lobby_id(state).await?;
    let store = state.require_session_store().await?;
    let uid = state.identity().uid.clone();

    match fetch_lobby(store.as_ref(), &lobby_id).await {
        Ok(lobby) => match lobby_machine::plan(&lobby, &uid, LobbyEvent::Leave) {
            Ok(transition) if transition.deletes_lobby() => {
                store.delete_document(LOBBY_COLLECTION, &lobby_id).await?;
                info!(lobby_id = %lobby_id, "host left; lobby deleted");
            }
            Ok(_) => {
                let update = DocumentUpdate::new().remove_matching("players", "uid", uid.as_str());
                match store.update_document(LOBBY_COLLECTION, &lobby_id, update).await {
                    Ok(()) | Err(StorageError::NotFound { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
                info!(lobby_id = %lobby_id, uid = %uid, "left lobby");
            }
            Err(TransitionError::NotMember) => {
                debug!(lobby_id = %lobby_id, "already removed from lobby");
            }
            Err(err) => return Err(err.into()),
        },
        Err(ServiceError::LobbyNotFound(_)) => {
            debug!(lobby_id = %lobby_id, "lobby already gone");
        }
        Err(err) => return Err(err),
    }

    drop(close_local(state, &lobby_id, CloseReason::Left).await);
    Ok(())
}

/// Flip the ready flag of the local player. The host is always ready.
pub async fn toggle_ready(state: &SharedState) -> Result<ReadyResponse, ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    let uid = &state.identity().uid;
    lobby_machine::plan(&lobby, uid, LobbyEvent::ToggleReady)?;

    if lobby.is_host(uid) {
        return Ok(ReadyResponse { is_ready: true });
    }
    let is_ready = !lobby.player(uid).is_some_and(|player| player.is_ready);

    let update = DocumentUpdate::new()
        .set(player_path(uid).then("isReady"), is_ready)
        .guard_equals("status", status_value(LobbyStatus::Waiting));
    store.update_document(LOBBY_COLLECTION, &lobby.id, update).await?;
    debug!(lobby_id = %lobby.id, uid = %uid, is_ready, "ready flag toggled");
    Ok(ReadyResponse { is_ready })
}

/// Start the game: pick every start offset and move the lobby to `playing`.
pub async fn start_game(state: &SharedState) -> Result<(), ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    lobby_machine::plan(&lobby, &state.identity().uid, LobbyEvent::Start)?;

    let clip_ms = state.config().clip_length_ms();
    let positions: Vec<u64> = lobby
        .tracks
        .iter()
        .map(|track| scheduler::start_offset_for(lobby.playback_mode, track, clip_ms))
        .collect();

    let update = DocumentUpdate::new()
        .set("status", status_value(LobbyStatus::Playing))
        .set("currentTrackIndex", 0)
        .set("startPositions", json!(positions))
        .server_timestamp("startedAt")
        .guard_equals("status", status_value(LobbyStatus::Waiting))
        .guard_len("players", lobby.players.len());
    store.update_document(LOBBY_COLLECTION, &lobby.id, update).await?;
    info!(lobby_id = %lobby.id, questions = lobby.total_questions(), "game started");
    Ok(())
}

/// Record the local player's answer to the current question.
///
/// Repeated submissions for an already answered question are reported as
/// duplicates and write nothing.
pub async fn submit_answer(
    state: &SharedState,
    choice: &str,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let store = state.require_session_store().await?;

    let (lobby_id, pending) = {
        let mut local = state.local().await;
        let lobby_id = local.lobby_id.clone().ok_or(ServiceError::NoActiveLobby)?;
        let question = local.question.as_mut().ok_or(ServiceError::NoOpenQuestion)?;

        match &question.answer {
            AnswerState::Answered(outcome) => {
                return Ok(SubmitAnswerResponse {
                    outcome: outcome.clone(),
                    duplicate: true,
                });
            }
            AnswerState::InFlight => return Err(ServiceError::AnswerInFlight),
            AnswerState::Open => {}
        }
        if question.is_expired() {
            return Err(ServiceError::AnswerWindowClosed);
        }
        if !question.options.iter().any(|option| option == choice) {
            return Err(ServiceError::InvalidInput(format!(
                "`{choice}` is not one of the options"
            )));
        }

        let window_ms = question.window.as_millis() as u64;
        let time_to_answer_ms = question.elapsed_ms().min(window_ms);
        let is_correct = choice == question.track.name;
        question.answer = AnswerState::InFlight;
        let pending = PendingAnswer {
            index: question.index,
            track_id: question.track.id.clone(),
            outcome: AnswerOutcome {
                index: question.index,
                user_answer: choice.to_owned(),
                correct_answer: question.track.name.clone(),
                is_correct,
                points: scoring::score(is_correct, time_to_answer_ms, window_ms),
                time_to_answer_ms,
                timed_out: false,
            },
        };
        (lobby_id, pending)
    };

    write_own_answer(state, store, &lobby_id, pending).await
}

/// Record a timeout for question `index` unless the local player already answered it.
pub async fn handle_timeout(state: &SharedState, index: usize) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;

    let (lobby_id, pending) = {
        let mut local = state.local().await;
        let Some(lobby_id) = local.lobby_id.clone() else {
            return Ok(());
        };
        let Some(question) = local.question.as_mut() else {
            return Ok(());
        };
        if question.index != index || question.answer != AnswerState::Open {
            return Ok(());
        }

        question.answer = AnswerState::InFlight;
        let pending = PendingAnswer {
            index,
            track_id: question.track.id.clone(),
            outcome: timeout_outcome(index, &question.track.name, question.window.as_millis() as u64),
        };
        (lobby_id, pending)
    };

    info!(lobby_id = %lobby_id, index, "answer window expired");
    write_own_answer(state, store, &lobby_id, pending).await?;
    Ok(())
}

/// Time out every member that has not answered question `index` (host only).
///
/// Each write is guarded on the member's answer count, so a late answer that
/// lands first wins and the synthetic one is dropped.
pub async fn enforce_stragglers(state: &SharedState, index: usize) -> Result<usize, ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    if !lobby.is_host(&state.identity().uid)
        || lobby.status != LobbyStatus::Playing
        || lobby.current_track_index != index
    {
        return Ok(0);
    }
    let Some(track) = lobby.current_track() else {
        return Ok(0);
    };

    let window_ms = state.config().question_time_ms();
    let mut enforced = 0;
    for uid in lobby.pending_answers() {
        let outcome = timeout_outcome(index, &track.name, window_ms);
        let update = answer_update(&uid, index, &answer_entity(&track.id, &outcome), 0)?;
        match store.update_document(LOBBY_COLLECTION, &lobby.id, update).await {
            Ok(()) => {
                info!(lobby_id = %lobby.id, uid = %uid, index, "timed out silent player");
                enforced += 1;
            }
            Err(err) if err.is_precondition_failure() => {
                debug!(lobby_id = %lobby.id, uid = %uid, "player answered before the timeout");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(enforced)
}

/// Move to the next question, or finish the game after the last one (host only).
pub async fn advance_question(state: &SharedState) -> Result<AdvanceResponse, ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    let transition = lobby_machine::plan(&lobby, &state.identity().uid, LobbyEvent::Advance)?;

    if transition.finishes_game() {
        let report = finish_lobby(state, store, &lobby).await?;
        return Ok(AdvanceResponse {
            finished: true,
            current_track_index: lobby.current_track_index,
            report: Some(report),
        });
    }

    let index = lobby.current_track_index;
    let update = DocumentUpdate::new()
        .increment("currentTrackIndex", 1)
        .guard_equals("currentTrackIndex", index)
        .guard_equals("status", status_value(LobbyStatus::Playing));
    store.update_document(LOBBY_COLLECTION, &lobby.id, update).await?;
    info!(lobby_id = %lobby.id, index = index + 1, "advanced to next question");

    Ok(AdvanceResponse {
        finished: false,
        current_track_index: index + 1,
        report: None,
    })
}

/// Advance on behalf of the host once everyone answered question `index`.
///
/// Returns `None` when the cursor already moved past `index`.
pub async fn auto_advance(
    state: &SharedState,
    index: usize,
) -> Result<Option<AdvanceResponse>, ServiceError> {
    let (_, lobby) = active_lobby(state).await?;
    if lobby.status != LobbyStatus::Playing || lobby.current_track_index != index {
        debug!(lobby_id = %lobby.id, index, "question already advanced");
        return Ok(None);
    }
    advance_question(state).await.map(Some)
}

/// Finish the game once the last question is complete (host only).
pub async fn finish_game(state: &SharedState) -> Result<FinishReport, ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    let transition = lobby_machine::plan(&lobby, &state.identity().uid, LobbyEvent::Advance)?;
    if !transition.finishes_game() {
        return Err(ServiceError::InvalidInput(format!(
            "{} question(s) remain",
            lobby.total_questions() - lobby.current_track_index - 1
        )));
    }
    finish_lobby(state, store, &lobby).await
}

/// Reset scores and answers and return the lobby to `waiting` (host only).
pub async fn play_again(state: &SharedState) -> Result<(), ServiceError> {
    let (store, lobby) = active_lobby(state).await?;
    lobby_machine::plan(&lobby, &state.identity().uid, LobbyEvent::PlayAgain)?;

    let players: Vec<PlayerEntity> = lobby
        .players
        .values()
        .map(|player| PlayerEntity {
            uid: player.uid.clone(),
            display_name: player.display_name.clone(),
            photo_url: player.photo_url.clone(),
            score: 0,
            answers: Vec::new(),
            is_ready: lobby.is_host(&player.uid),
        })
        .collect();

    let update = DocumentUpdate::new()
        .set("players", encode(&players)?)
        .set("status", status_value(LobbyStatus::Waiting))
        .set("currentTrackIndex", 0)
        .set("startPositions", Value::Null)
        .set("startedAt", Value::Null)
        .guard_equals("status", status_value(LobbyStatus::Finished));
    store.update_document(LOBBY_COLLECTION, &lobby.id, update).await?;
    info!(lobby_id = %lobby.id, "lobby reset for another round");
    Ok(())
}

/// Waiting lobbies, newest first. Unreadable or hostless documents are skipped.
pub async fn list_open_lobbies(
    state: &SharedState,
    limit: usize,
) -> Result<Vec<LobbyListing>, ServiceError> {
    let store = state.require_session_store().await?;
    let query = DocumentQuery::all()
        .where_eq("status", status_value(LobbyStatus::Waiting))
        .order_by("createdAt", SortDirection::Descending)
        .limit(limit);
    let documents = store.query_documents(LOBBY_COLLECTION, query).await?;

    let listings = documents
        .into_iter()
        .filter_map(|document| match Lobby::from_document(&document.id, document.data) {
            Ok(lobby) => lobby.host().map(|host| LobbyListing {
                id: lobby.id.clone(),
                host_name: host.display_name.clone(),
                players: lobby.players.len(),
                max_players: lobby.max_players,
                total_questions: lobby.total_questions(),
                playback_mode: lobby.playback_mode,
                created_at: lobby.created_at.map(format_epoch_millis),
            }),
            Err(err) => {
                warn!(lobby_id = %document.id, error = %err, "skipping unreadable lobby");
                None
            }
        })
        .collect();
    Ok(listings)
}

/// Profiles ranked by total score.
pub async fn leaderboard(
    state: &SharedState,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let store = state.require_session_store().await?;
    Ok(history_service::leaderboard(store, limit).await?)
}

/// Everything the local UI needs to render the current view.
pub async fn local_state(state: &SharedState) -> LocalStateResponse {
    let local = state.local().await;
    let total = local
        .snapshot
        .as_ref()
        .map(Lobby::total_questions)
        .unwrap_or_default();
    LocalStateResponse {
        view: local.tracker.view(),
        uid: state.identity().uid.clone(),
        lobby_id: local.lobby_id.clone(),
        lobby: local.snapshot.as_ref().map(LobbySummary::from),
        question: local
            .question
            .as_ref()
            .map(|question| QuestionSummary::new(question, total)),
    }
}

/// Forget the lobby locally, release playback and tell the UI.
///
/// The subscription guard is returned so the caller decides whether the loop is
/// aborted (explicit leave) or detached (the loop closing its own lobby).
#[must_use]
pub(crate) async fn close_local(
    state: &SharedState,
    lobby_id: &str,
    reason: CloseReason,
) -> Option<TaskGuard> {
    let (reconciliation, subscription) = {
        let mut local = state.local().await;
        if !local.is_in(lobby_id) {
            return None;
        }
        local.close()
    };
    state.playback().release().await;
    sse_events::broadcast_view_change(state, &reconciliation, None);
    sse_events::broadcast_lobby_closed(state, lobby_id, reason);
    info!(lobby_id = %lobby_id, ?reason, "left lobby view");
    subscription
}

/// Mark the lobby finished, then record every player's results.
async fn finish_lobby(
    state: &SharedState,
    store: Arc<dyn SessionStore>,
    lobby: &Lobby,
) -> Result<FinishReport, ServiceError> {
    let update = DocumentUpdate::new()
        .set("status", status_value(LobbyStatus::Finished))
        .guard_equals("status", status_value(LobbyStatus::Playing))
        .guard_equals("currentTrackIndex", lobby.current_track_index);
    store.update_document(LOBBY_COLLECTION, &lobby.id, update).await?;
    info!(lobby_id = %lobby.id, "game finished");

    let report = history_service::record_results(store, lobby).await;
    sse_events::broadcast_game_finished(state, &report);
    Ok(report)
}

/// Subscribe to `lobby_id` and take over the local lobby memory and playback.
async fn enter_lobby(
    state: &SharedState,
    store: Arc<dyn SessionStore>,
    lobby_id: &str,
) -> Result<(), ServiceError> {
    let stream = store.subscribe_document(LOBBY_COLLECTION, lobby_id).await?;
    state.playback().acquire().await;

    let mut local = state.local().await;
    local.lobby_id = Some(lobby_id.to_owned());
    local.subscription = Some(TaskGuard::spawn(sync_service::run_subscription(
        state.clone(),
        lobby_id.to_owned(),
        stream,
    )));
    debug!(lobby_id = %lobby_id, "subscribed to lobby");
    Ok(())
}

/// Answer of the local player waiting to be written.
struct PendingAnswer {
    index: usize,
    track_id: String,
    outcome: AnswerOutcome,
}

async fn write_own_answer(
    state: &SharedState,
    store: Arc<dyn SessionStore>,
    lobby_id: &str,
    pending: PendingAnswer,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let uid = &state.identity().uid;
    let PendingAnswer {
        index,
        track_id,
        outcome,
    } = pending;
    let written = match answer_update(uid, index, &answer_entity(&track_id, &outcome), outcome.points) {
        Ok(update) => match store.update_document(LOBBY_COLLECTION, lobby_id, update).await {
            Ok(()) => Ok(SubmitAnswerResponse {
                outcome,
                duplicate: false,
            }),
            Err(err) if err.is_precondition_failure() => {
                match stored_answer(state, store.as_ref(), lobby_id, index).await {
                    Some(existing) => {
                        debug!(lobby_id = %lobby_id, index, "answer already recorded");
                        Ok(SubmitAnswerResponse {
                            outcome: existing,
                            duplicate: true,
                        })
                    }
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        },
        Err(err) => Err(err),
    };

    let mut local = state.local().await;
    let same_lobby = local.is_in(lobby_id);
    let question = local
        .question
        .as_mut()
        .filter(|question| same_lobby && question.index == index);
    match written {
        Ok(response) => {
            if let Some(question) = question {
                question.answer = AnswerState::Answered(response.outcome.clone());
            }
            drop(local);
            if !response.duplicate {
                debug!(lobby_id = %lobby_id, index, points = response.outcome.points, "answer recorded");
            }
            sse_events::broadcast_answer(state, &response.outcome);
            Ok(response)
        }
        Err(err) => {
            if let Some(question) = question {
                question.answer = AnswerState::Open;
            }
            warn!(lobby_id = %lobby_id, index, error = %err, "failed to record answer");
            Err(err)
        }
    }
}

/// Answer the local player already has in the document for question `index`.
async fn stored_answer(
    state: &SharedState,
    store: &dyn SessionStore,
    lobby_id: &str,
    index: usize,
) -> Option<AnswerOutcome> {
    let lobby = match fetch_lobby(store, lobby_id).await {
        Ok(lobby) => lobby,
        Err(err) => {
            debug!(lobby_id = %lobby_id, error = %err, "cannot re-read lobby after rejected answer");
            return None;
        }
    };
    let recorded = lobby
        .player(&state.identity().uid)
        .and_then(|player| player.answers.get(index))?;
    Some(recorded_outcome(index, recorded, state.config().question_time_ms()))
}

/// Local view of an answer already stored for question `index`.
pub(crate) fn recorded_outcome(index: usize, recorded: &Answer, window_ms: u64) -> AnswerOutcome {
    AnswerOutcome {
        index,
        user_answer: recorded.user_answer.clone(),
        correct_answer: recorded.correct_answer.clone(),
        is_correct: recorded.is_correct,
        points: scoring::score(recorded.is_correct, recorded.time_to_answer_ms, window_ms),
        time_to_answer_ms: recorded.time_to_answer_ms,
        timed_out: recorded.is_timeout(),
    }
}

fn answer_update(
    uid: &str,
    index: usize,
    answer: &AnswerEntity,
    points: i64,
) -> Result<DocumentUpdate, ServiceError> {
    answer.validate()?;
    let player = player_path(uid);
    Ok(DocumentUpdate::new()
        .append(player.clone().then("answers"), encode(answer)?)
        .increment(player.clone().then("score"), points)
        .guard_equals("status", status_value(LobbyStatus::Playing))
        .guard_equals("currentTrackIndex", index)
        .guard_len(player.then("answers"), index))
}

fn answer_entity(track_id: &str, outcome: &AnswerOutcome) -> AnswerEntity {
    AnswerEntity {
        track_id: track_id.to_owned(),
        correct_answer: outcome.correct_answer.clone(),
        user_answer: outcome.user_answer.clone(),
        is_correct: outcome.is_correct,
        time_to_answer: outcome.time_to_answer_ms,
    }
}

fn timeout_outcome(index: usize, correct_answer: &str, window_ms: u64) -> AnswerOutcome {
    AnswerOutcome {
        index,
        user_answer: TIMEOUT_ANSWER.to_owned(),
        correct_answer: correct_answer.to_owned(),
        is_correct: false,
        points: 0,
        time_to_answer_ms: window_ms,
        timed_out: true,
    }
}

fn new_player(identity: &Identity, is_ready: bool) -> PlayerEntity {
    PlayerEntity {
        uid: identity.uid.clone(),
        display_name: identity.display_name.clone(),
        photo_url: identity.photo_url.clone(),
        score: 0,
        answers: Vec::new(),
        is_ready,
    }
}

fn player_path(uid: &str) -> FieldPath {
    FieldPath::field("players").element("uid", uid)
}

fn status_value(status: LobbyStatus) -> Value {
    json!(status)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|err| {
        ServiceError::Unavailable(StorageError::unavailable(
            "failed to encode document".into(),
            err,
        ))
    })
}

async fn ensure_not_in_lobby(state: &SharedState) -> Result<(), ServiceError> {
    match &state.local().await.lobby_id {
        Some(current) => Err(ServiceError::AlreadyInLobby(current.clone())),
        None => Ok(()),
    }
}

async fn current_lobby_id(state: &SharedState) -> Result<String, ServiceError> {
    state
        .local()
        .await
        .lobby_id
        .clone()
        .ok_or(ServiceError::NoActiveLobby)
}

/// Fresh read of the joined lobby.
async fn active_lobby(state: &SharedState) -> Result<(Arc<dyn SessionStore>, Lobby), ServiceError> {
    let lobby_id = current_lobby_id(state).await?;
    let store = state.require_session_store().await?;
    let lobby = fetch_lobby(store.as_ref(), &lobby_id).await?;
    Ok((store, lobby))
}

async fn fetch_lobby(store: &dyn SessionStore, id: &str) -> Result<Lobby, ServiceError> {
    let document = store
        .get_document(LOBBY_COLLECTION, id)
        .await?
        .ok_or_else(|| ServiceError::LobbyNotFound(id.to_owned()))?;
    Ok(Lobby::from_document(id, document)?)
}
