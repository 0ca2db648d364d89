use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::state::{lobby::PlaybackMode, lobby_machine::LobbyStatus};

/// Version written into every lobby document created by this crate.
pub const LOBBY_SCHEMA_VERSION: u32 = 1;

/// Value recorded as `userAnswer` when the answer window closed without a choice.
pub const TIMEOUT_ANSWER: &str = "__timeout__";

/// Default cap on lobby members for documents written before `maxPlayers` existed.
pub const DEFAULT_MAX_PLAYERS: usize = 8;

fn default_max_players() -> usize {
    DEFAULT_MAX_PLAYERS
}

/// Shared lobby document as stored in the `lobbies` collection.
///
/// Every field except `hostId` has a default so that documents written by older
/// or sloppier clients still parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_lobby_shape"))]
pub struct LobbyEntity {
    /// Document schema version.
    #[serde(default)]
    pub schema_version: u32,
    /// Uid of the player allowed to start, advance and restart the game.
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
    /// Members in join order.
    #[serde(default)]
    #[validate(nested)]
    pub players: Vec<PlayerEntity>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: LobbyStatus,
    /// Tracks picked at creation time, one per question.
    #[serde(default)]
    #[validate(length(min = 1), nested)]
    pub tracks: Vec<TrackEntity>,
    /// Titles of every playable track of the playlist, fixed at creation and used
    /// for wrong options. Empty in documents written before the field existed.
    #[serde(default)]
    #[validate(length(max = 500), nested)]
    pub decoys: Vec<DecoyEntity>,
    /// Index of the current question.
    #[serde(default)]
    pub current_track_index: usize,
    /// Denormalised `tracks.len()`.
    #[serde(default)]
    pub total_questions: usize,
    /// Audio source used by every client.
    #[serde(default)]
    pub playback_mode: PlaybackMode,
    /// Per-track playback offsets chosen by the host when the game starts.
    #[serde(default)]
    pub start_positions: Option<Vec<u64>>,
    /// Membership cap.
    #[serde(default = "default_max_players")]
    #[validate(range(min = 1, max = 64))]
    pub max_players: usize,
    /// Creation time (epoch milliseconds).
    #[serde(default)]
    pub created_at: Option<u64>,
    /// Start time of the current playthrough (epoch milliseconds).
    #[serde(default)]
    pub started_at: Option<u64>,
}

fn validate_lobby_shape(lobby: &LobbyEntity) -> Result<(), ValidationError> {
    if lobby.total_questions != lobby.tracks.len() {
        return Err(ValidationError::new("total_questions_mismatch"));
    }
    if lobby
        .players
        .iter()
        .filter(|player| player.uid == lobby.host_id)
        .count()
        != 1
    {
        return Err(ValidationError::new("host_not_unique"));
    }
    if let Some(positions) = &lobby.start_positions
        && positions.len() != lobby.tracks.len()
    {
        return Err(ValidationError::new("start_positions_mismatch"));
    }
    Ok(())
}

/// Lobby member embedded in [`LobbyEntity::players`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntity {
    /// Identity from the auth provider.
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    /// Name shown to other players.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    /// Avatar URL.
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Running total for the current playthrough.
    #[serde(default)]
    pub score: i64,
    /// One entry per question attempted.
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerEntity>,
    /// Ready flag, ignored for the host.
    #[serde(default)]
    pub is_ready: bool,
}

/// Answer given by one player to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntity {
    /// Track the question was about.
    #[validate(length(min = 1))]
    pub track_id: String,
    /// Canonical track title.
    pub correct_answer: String,
    /// Chosen option, or [`TIMEOUT_ANSWER`].
    #[validate(length(min = 1, max = 256))]
    pub user_answer: String,
    /// Whether the chosen option was the track title.
    #[serde(default)]
    pub is_correct: bool,
    /// Milliseconds from question start to submission.
    #[serde(default)]
    pub time_to_answer: u64,
}

/// Track descriptor frozen into the lobby at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackEntity {
    /// Catalog identifier.
    #[validate(length(min = 1))]
    pub id: String,
    /// Track title; the correct answer.
    #[validate(length(min = 1))]
    pub name: String,
    /// Artist names.
    #[serde(default)]
    pub artists: Vec<String>,
    /// Album name.
    #[serde(default)]
    pub album: String,
    /// Short preview clip, when the catalog offers one.
    #[serde(default)]
    pub preview_url: Option<String>,
    /// Full track length.
    #[serde(default)]
    pub duration_ms: u64,
    /// Catalog URI used by SDK playback.
    #[serde(default)]
    pub uri: String,
}

/// Playlist title kept in the lobby as a wrong-option candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecoyEntity {
    /// Catalog identifier of the track.
    #[validate(length(min = 1))]
    pub id: String,
    /// Track title.
    #[validate(length(min = 1))]
    pub name: String,
    /// Artist names.
    #[serde(default)]
    pub artists: Vec<String>,
}

/// Append-only per-player record written when a game finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecordEntity {
    /// Document schema version.
    pub schema_version: u32,
    /// Player the record belongs to.
    pub uid: String,
    /// Display name at the time of the game.
    pub display_name: String,
    /// Lobby the game was played in.
    pub lobby_id: String,
    /// Final score.
    pub score: i64,
    /// Number of correct answers.
    pub correct_count: usize,
    /// Number of questions in the game.
    pub total_questions: usize,
    /// Audio source used for the game.
    pub playback_mode: PlaybackMode,
    /// Finish time (epoch milliseconds).
    pub played_at: u64,
    /// Every answer the player gave.
    pub answers: Vec<AnswerEntity>,
}

/// Long-lived aggregate stored under `profiles/{uid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntity {
    /// Latest known display name.
    #[serde(default)]
    pub display_name: String,
    /// Latest known avatar URL.
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Sum of every finished game's score.
    #[serde(default)]
    pub total_score: i64,
    /// Number of finished games.
    #[serde(default)]
    pub games_played: u64,
    /// Sum of correct answers over all games.
    #[serde(default)]
    pub correct_answers: u64,
    /// Last aggregation time (epoch milliseconds).
    #[serde(default)]
    pub updated_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_optional_fields_take_defaults() {
        let lobby: LobbyEntity = serde_json::from_value(json!({
            "hostId": "h",
            "players": [{"uid": "h", "displayName": "Host"}],
        }))
        .unwrap();

        assert_eq!(lobby.schema_version, 0);
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert_eq!(lobby.playback_mode, PlaybackMode::Preview);
        assert_eq!(lobby.max_players, DEFAULT_MAX_PLAYERS);
        assert!(lobby.start_positions.is_none());
        assert!(lobby.decoys.is_empty());
        assert!(lobby.players[0].answers.is_empty());
    }

    #[test]
    fn player_photo_uses_upper_case_url_key() {
        let player = PlayerEntity {
            uid: "u".into(),
            display_name: "U".into(),
            photo_url: Some("https://img".into()),
            score: 0,
            answers: vec![],
            is_ready: false,
        };
        let value = serde_json::to_value(&player).unwrap();
        assert_eq!(value["photoURL"], json!("https://img"));
        assert_eq!(value["isReady"], json!(false));
    }

    #[test]
    fn shape_validation_rejects_second_host_entry() {
        let host = PlayerEntity {
            uid: "h".into(),
            display_name: "Host".into(),
            photo_url: None,
            score: 0,
            answers: vec![],
            is_ready: true,
        };
        let track = TrackEntity {
            id: "t".into(),
            name: "Song".into(),
            artists: vec![],
            album: String::new(),
            preview_url: None,
            duration_ms: 1,
            uri: String::new(),
        };
        let lobby = LobbyEntity {
            schema_version: LOBBY_SCHEMA_VERSION,
            host_id: "h".into(),
            players: vec![host.clone(), host],
            status: LobbyStatus::Waiting,
            tracks: vec![track],
            decoys: Vec::new(),
            current_track_index: 0,
            total_questions: 1,
            playback_mode: PlaybackMode::Preview,
            start_positions: None,
            max_players: 8,
            created_at: None,
            started_at: None,
        };
        assert!(lobby.validate().is_err());
    }
}
