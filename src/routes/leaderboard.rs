use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::lobby::{LeaderboardEntry, ListQuery},
    error::AppError,
    services::lobby_service,
    state::SharedState,
};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// Leaderboard routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/leaderboard", get(leaderboard))
}

/// Players ranked by the sum of their finished games.
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "browser",
    params(ListQuery),
    responses((status = 200, description = "Leaderboard", body = [LeaderboardEntry]))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<ListQuery>>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let entries =
        lobby_service::leaderboard(&state, query.limit_or(DEFAULT_LEADERBOARD_SIZE)).await?;
    Ok(Json(entries))
}
