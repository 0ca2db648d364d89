use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::{
        lobby::MessageResponse,
        playback::{PlaybackNoticeRequest, VolumeRequest},
    },
    error::AppError,
    services::{playback::PlaybackNotice, sse_events},
    state::SharedState,
};

/// Routes through which the UI reports on the clips it was asked to play.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/playback/events", post(report_playback))
        .route("/playback/volume", post(set_volume))
}

/// Receive a ready/error notification for a prepared clip.
#[utoipa::path(
    post,
    path = "/playback/events",
    tag = "playback",
    request_body = PlaybackNoticeRequest,
    responses((status = 200, description = "Notification recorded", body = MessageResponse))
)]
pub async fn report_playback(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PlaybackNoticeRequest>>,
) -> Json<MessageResponse> {
    let notice = PlaybackNotice::from(payload);
    if let PlaybackNotice::Error { handle, message } = &notice
        && state.playback().current().await == Some(*handle)
    {
        sse_events::broadcast_error(&state, format!("playback failed: {message}"));
    }
    state.playback().report(notice).await;
    Json(MessageResponse::new("notification recorded"))
}

/// Change the output volume of the local player.
#[utoipa::path(
    post,
    path = "/playback/volume",
    tag = "playback",
    request_body = VolumeRequest,
    responses(
        (status = 200, description = "Volume changed", body = MessageResponse),
        (status = 400, description = "Volume out of range")
    )
)]
pub async fn set_volume(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<VolumeRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .playback()
        .set_volume(payload.volume)
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    Ok(Json(MessageResponse::new("volume changed")))
}
