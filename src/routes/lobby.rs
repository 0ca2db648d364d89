use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::lobby::{
        AdvanceResponse, CreateLobbyRequest, JoinLobbyResponse, ListQuery, LobbyCreatedResponse,
        LobbyListing, LocalStateResponse, MessageResponse, ReadyResponse, SubmitAnswerRequest,
        SubmitAnswerResponse,
    },
    error::AppError,
    services::{history_service::FinishReport, lobby_service},
    state::SharedState,
};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LOBBY_ID_LENGTH: usize = 64;

/// Routes carrying the local player's lobby intents.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies", post(create_lobby).get(list_lobbies))
        .route("/lobbies/{id}/join", post(join_lobby))
        .route("/lobby", get(local_state))
        .route("/lobby/leave", post(leave_lobby))
        .route("/lobby/ready", post(toggle_ready))
        .route("/lobby/start", post(start_game))
        .route("/lobby/answer", post(submit_answer))
        .route("/lobby/advance", post(advance_question))
        .route("/lobby/finish", post(finish_game))
        .route("/lobby/play-again", post(play_again))
}

/// Create a lobby from a playlist and join it as host.
#[utoipa::path(
    post,
    path = "/lobbies",
    tag = "lobby",
    request_body = CreateLobbyRequest,
    responses(
        (status = 200, description = "Lobby created", body = LobbyCreatedResponse),
        (status = 400, description = "Invalid playlist or too few playable tracks"),
        (status = 409, description = "Already in a lobby")
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateLobbyRequest>>,
) -> Result<Json<LobbyCreatedResponse>, AppError> {
    let created = lobby_service::create_lobby(&state, payload).await?;
    Ok(Json(created))
}

/// List lobbies waiting for players, newest first.
#[utoipa::path(
    get,
    path = "/lobbies",
    tag = "browser",
    params(ListQuery),
    responses((status = 200, description = "Open lobbies", body = [LobbyListing]))
)]
pub async fn list_lobbies(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<Json<Vec<LobbyListing>>, AppError> {
    let listings =
        lobby_service::list_open_lobbies(&state, query.limit_or(DEFAULT_LIST_LIMIT)).await?;
    Ok(Json(listings))
}

/// Join a lobby by its code.
#[utoipa::path(
    post,
    path = "/lobbies/{id}/join",
    tag = "lobby",
    params(("id" = String, Path, description = "Lobby code")),
    responses(
        (status = 200, description = "Joined", body = JoinLobbyResponse),
        (status = 404, description = "Unknown lobby"),
        (status = 409, description = "Game already started or lobby full")
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<JoinLobbyResponse>, AppError> {
    let id = id.trim();
    if id.is_empty() || id.len() > MAX_LOBBY_ID_LENGTH {
        return Err(AppError::BadRequest("invalid lobby code".into()));
    }
    let joined = lobby_service::join_lobby(&state, &id.to_uppercase()).await?;
    Ok(Json(joined))
}

/// Current view, lobby and question as seen by this client.
#[utoipa::path(
    get,
    path = "/lobby",
    tag = "lobby",
    responses((status = 200, description = "Local state", body = LocalStateResponse))
)]
pub async fn local_state(State(state): State<SharedState>) -> Json<LocalStateResponse> {
    Json(lobby_service::local_state(&state).await)
}

/// Leave the current lobby. The host deletes it for everyone.
#[utoipa::path(
    post,
    path = "/lobby/leave",
    tag = "lobby",
    responses((status = 200, description = "Left", body = MessageResponse))
)]
pub async fn leave_lobby(
    State(state): State<SharedState>,
) -> Result<Json<MessageResponse>, AppError> {
    lobby_service::leave_lobby(&state).await?;
    Ok(Json(MessageResponse::new("left lobby")))
}

/// Toggle the local player's ready flag.
#[utoipa::path(
    post,
    path = "/lobby/ready",
    tag = "lobby",
    responses((status = 200, description = "Ready flag toggled", body = ReadyResponse))
)]
pub async fn toggle_ready(
    State(state): State<SharedState>,
) -> Result<Json<ReadyResponse>, AppError> {
    Ok(Json(lobby_service::toggle_ready(&state).await?))
}

/// Start the game (host only).
#[utoipa::path(
    post,
    path = "/lobby/start",
    tag = "lobby",
    responses(
        (status = 200, description = "Game started", body = MessageResponse),
        (status = 403, description = "Not the host"),
        (status = 409, description = "Players not ready")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
) -> Result<Json<MessageResponse>, AppError> {
    lobby_service::start_game(&state).await?;
    Ok(Json(MessageResponse::new("game started")))
}

/// Answer the current question.
#[utoipa::path(
    post,
    path = "/lobby/answer",
    tag = "lobby",
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 400, description = "Unknown option or window closed")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    Ok(Json(
        lobby_service::submit_answer(&state, &payload.choice).await?,
    ))
}

/// Move to the next question once everyone answered (host only).
#[utoipa::path(
    post,
    path = "/lobby/advance",
    tag = "lobby",
    responses(
        (status = 200, description = "Advanced or finished", body = AdvanceResponse),
        (status = 409, description = "Answers pending or lobby changed")
    )
)]
pub async fn advance_question(
    State(state): State<SharedState>,
) -> Result<Json<AdvanceResponse>, AppError> {
    Ok(Json(lobby_service::advance_question(&state).await?))
}

/// Finish the game after the last question (host only).
#[utoipa::path(
    post,
    path = "/lobby/finish",
    tag = "lobby",
    responses((status = 200, description = "Game finished", body = FinishReport))
)]
pub async fn finish_game(
    State(state): State<SharedState>,
) -> Result<Json<FinishReport>, AppError> {
    Ok(Json(lobby_service::finish_game(&state).await?))
}

/// Reset the finished lobby for another round (host only).
#[utoipa::path(
    post,
    path = "/lobby/play-again",
    tag = "lobby",
    responses((status = 200, description = "Lobby reset", body = MessageResponse))
)]
pub async fn play_again(
    State(state): State<SharedState>,
) -> Result<Json<MessageResponse>, AppError> {
    lobby_service::play_again(&state).await?;
    Ok(Json(MessageResponse::new("lobby reset")))
}
