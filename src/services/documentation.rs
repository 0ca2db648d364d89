use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the lobby daemon.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::ui_stream,
        crate::routes::lobby::create_lobby,
        crate::routes::lobby::list_lobbies,
        crate::routes::lobby::join_lobby,
        crate::routes::lobby::local_state,
        crate::routes::lobby::leave_lobby,
        crate::routes::lobby::toggle_ready,
        crate::routes::lobby::start_game,
        crate::routes::lobby::submit_answer,
        crate::routes::lobby::advance_question,
        crate::routes::lobby::finish_game,
        crate::routes::lobby::play_again,
        crate::routes::leaderboard::leaderboard,
        crate::routes::playback::report_playback,
        crate::routes::playback::set_volume,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::lobby::CreateLobbyRequest,
            crate::dto::lobby::LobbyCreatedResponse,
            crate::dto::lobby::JoinLobbyResponse,
            crate::dto::lobby::ReadyResponse,
            crate::dto::lobby::AdvanceResponse,
            crate::dto::lobby::SubmitAnswerRequest,
            crate::dto::lobby::SubmitAnswerResponse,
            crate::dto::lobby::MessageResponse,
            crate::dto::lobby::PlayerSummary,
            crate::dto::lobby::LobbySummary,
            crate::dto::lobby::QuestionSummary,
            crate::dto::lobby::LocalStateResponse,
            crate::dto::lobby::LobbyListing,
            crate::dto::lobby::LeaderboardEntry,
            crate::dto::playback::PreparePlaybackEvent,
            crate::dto::playback::PausePlaybackEvent,
            crate::dto::playback::VolumeEvent,
            crate::dto::playback::PlaybackNoticeRequest,
            crate::dto::playback::PlaybackNoticeKind,
            crate::dto::playback::VolumeRequest,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ViewChangedEvent,
            crate::dto::sse::CloseReason,
            crate::dto::sse::LobbyClosedEvent,
            crate::dto::sse::ErrorEvent,
            crate::services::history_service::FinishReport,
            crate::services::playback::PlaybackHandle,
            crate::state::session::AnswerOutcome,
            crate::state::view::View,
            crate::state::lobby::PlaybackMode,
            crate::state::lobby_machine::LobbyStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events stream for the local UI"),
        (name = "lobby", description = "Intents of the local player"),
        (name = "browser", description = "Open lobbies and leaderboard"),
        (name = "playback", description = "Playback notifications from the UI"),
    )
)]
pub struct ApiDoc;
