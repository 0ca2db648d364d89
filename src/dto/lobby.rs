use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::validation::validate_playlist_url,
    services::history_service::FinishReport,
    state::{
        lobby::{Lobby, PlaybackMode, Player},
        lobby_machine::LobbyStatus,
        session::{ActiveQuestion, AnswerOutcome, AnswerState},
        view::View,
    },
};

/// Request body for `POST /lobbies`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateLobbyRequest {
    /// Playlist share link, catalog URI or bare id.
    #[validate(
        length(min = 1, max = 512),
        custom(function = "validate_playlist_url")
    )]
    pub playlist_url: String,
    /// Number of questions to play.
    #[validate(range(min = 1, max = 50))]
    pub question_count: usize,
    /// Audio source for every client.
    #[serde(default)]
    pub mode: PlaybackMode,
}

/// Response of `POST /lobbies`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbyCreatedResponse {
    /// Lobby id, shareable as join code.
    pub id: String,
}

/// Response of `POST /lobbies/{id}/join`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinLobbyResponse {
    /// Lobby id.
    pub id: String,
    /// Whether the client was already a member and only re-subscribed.
    pub already_member: bool,
}

/// Request body for `POST /lobby/answer`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    /// One of the options of the current question.
    #[validate(length(min = 1, max = 256))]
    pub choice: String,
}

/// Response of `POST /lobby/answer`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Recorded answer.
    pub outcome: AnswerOutcome,
    /// Whether the call repeated an answer already recorded.
    pub duplicate: bool,
}

/// Response of `POST /lobby/ready`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Ready flag after the toggle.
    pub is_ready: bool,
}

/// Response of `POST /lobby/advance` and `POST /lobby/finish`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdvanceResponse {
    /// Whether the game is now finished.
    pub finished: bool,
    /// Question index after the transition.
    pub current_track_index: usize,
    /// Outcome of the result writes, once the game finished.
    pub report: Option<FinishReport>,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// Acknowledgement with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query string of list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
pub struct ListQuery {
    /// Maximum number of entries.
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Requested limit or `default`.
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

/// One member as shown in the lobby and results views.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Identity.
    pub uid: String,
    /// Display name.
    pub display_name: String,
    /// Avatar URL.
    pub photo_url: Option<String>,
    /// Running score.
    pub score: i64,
    /// Questions answered so far.
    pub answered: usize,
    /// Correct answers so far.
    pub correct: usize,
    /// Ready flag (always true for the host).
    pub is_ready: bool,
    /// Whether the member hosts the lobby.
    pub is_host: bool,
}

impl PlayerSummary {
    fn from_player(player: &Player, host_id: &str) -> Self {
        let is_host = player.uid == host_id;
        Self {
            uid: player.uid.clone(),
            display_name: player.display_name.clone(),
            photo_url: player.photo_url.clone(),
            score: player.score,
            answered: player.answers.len(),
            correct: player.correct_count(),
            is_ready: is_host || player.is_ready,
            is_host,
        }
    }
}

/// Shared lobby state as exposed to the UI. Track titles are never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbySummary {
    /// Lobby id.
    pub id: String,
    /// Host uid.
    pub host_id: String,
    /// Lifecycle status.
    pub status: LobbyStatus,
    /// Members in join order.
    pub players: Vec<PlayerSummary>,
    /// Current question.
    pub current_track_index: usize,
    /// Number of questions.
    pub total_questions: usize,
    /// Audio source.
    pub playback_mode: PlaybackMode,
    /// Membership cap.
    pub max_players: usize,
}

impl From<&Lobby> for LobbySummary {
    fn from(lobby: &Lobby) -> Self {
        Self {
            id: lobby.id.clone(),
            host_id: lobby.host_id.clone(),
            status: lobby.status,
            players: lobby
                .players
                .values()
                .map(|player| PlayerSummary::from_player(player, &lobby.host_id))
                .collect(),
            current_track_index: lobby.current_track_index,
            total_questions: lobby.total_questions(),
            playback_mode: lobby.playback_mode,
            max_players: lobby.max_players,
        }
    }
}

/// Question as exposed to the UI; the correct title only appears once answered.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSummary {
    /// Question index.
    pub index: usize,
    /// Number of questions.
    pub total: usize,
    /// Shuffled options.
    pub options: Vec<String>,
    /// Agreed playback offset.
    pub start_offset_ms: u64,
    /// Length of the answer window.
    pub window_ms: u64,
    /// Time left in the answer window.
    pub remaining_ms: u64,
    /// This client's answer, once recorded.
    pub answer: Option<AnswerOutcome>,
}

impl QuestionSummary {
    /// Summary of `question` in a game of `total` questions.
    pub fn new(question: &ActiveQuestion, total: usize) -> Self {
        let window_ms = question.window.as_millis() as u64;
        Self {
            index: question.index,
            total,
            options: question.options.clone(),
            start_offset_ms: question.start_offset_ms,
            window_ms,
            remaining_ms: window_ms.saturating_sub(question.elapsed_ms()),
            answer: match &question.answer {
                AnswerState::Answered(outcome) => Some(outcome.clone()),
                AnswerState::Open | AnswerState::InFlight => None,
            },
        }
    }
}

/// Response of `GET /lobby`: everything the local UI needs to render.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocalStateResponse {
    /// Current view.
    pub view: View,
    /// Uid of this client.
    pub uid: String,
    /// Joined lobby, if any.
    pub lobby_id: Option<String>,
    /// Last observed lobby state.
    pub lobby: Option<LobbySummary>,
    /// Current question.
    pub question: Option<QuestionSummary>,
}

/// Waiting lobby listed by the lobby browser.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbyListing {
    /// Join code.
    pub id: String,
    /// Host display name.
    pub host_name: String,
    /// Current member count.
    pub players: usize,
    /// Membership cap.
    pub max_players: usize,
    /// Number of questions.
    pub total_questions: usize,
    /// Audio source.
    pub playback_mode: PlaybackMode,
    /// Creation time (RFC 3339).
    pub created_at: Option<String>,
}

/// Leaderboard row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: usize,
    /// Identity.
    pub uid: String,
    /// Display name.
    pub display_name: String,
    /// Avatar URL.
    pub photo_url: Option<String>,
    /// Sum of finished games' scores.
    pub total_score: i64,
    /// Finished games.
    pub games_played: u64,
    /// Correct answers over all games.
    pub correct_answers: u64,
}
