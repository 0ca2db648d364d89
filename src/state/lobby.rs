use std::borrow::Cow;

use indexmap::{IndexMap, map::Entry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::models::{
        AnswerEntity, DecoyEntity, LOBBY_SCHEMA_VERSION, LobbyEntity, PlayerEntity,
        TIMEOUT_ANSWER, TrackEntity,
    },
    state::lobby_machine::LobbyStatus,
};

/// Audio source every client of a lobby uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Short preview clips served by the catalog.
    #[default]
    Preview,
    /// Full tracks through the catalog's playback SDK.
    Sdk,
}

/// Reasons a received lobby document cannot be used.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document does not have the expected JSON shape.
    #[error("malformed lobby document: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The document was written by a newer schema.
    #[error("unsupported lobby schema version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },
    /// The document has no host.
    #[error("lobby document has no host")]
    MissingHost,
    /// A locally built document failed validation.
    #[error("invalid lobby document: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Runtime view of a track frozen into a lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Catalog identifier.
    pub id: String,
    /// Title; the correct answer.
    pub name: String,
    /// Artist names.
    pub artists: Vec<String>,
    /// Album name.
    pub album: String,
    /// Preview clip URL, if any.
    pub preview_url: Option<String>,
    /// Length of the full track.
    pub duration_ms: u64,
    /// Catalog URI for SDK playback.
    pub uri: String,
}

impl Track {
    /// Whether the track can be played in `mode`.
    pub fn is_playable(&self, mode: PlaybackMode) -> bool {
        match mode {
            PlaybackMode::Preview => self
                .preview_url
                .as_deref()
                .is_some_and(|url| !url.is_empty()),
            PlaybackMode::Sdk => !self.uri.is_empty(),
        }
    }
}

impl From<TrackEntity> for Track {
    fn from(entity: TrackEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            artists: entity.artists,
            album: entity.album,
            preview_url: entity.preview_url,
            duration_ms: entity.duration_ms,
            uri: entity.uri,
        }
    }
}

impl From<&Track> for TrackEntity {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artists: track.artists.clone(),
            album: track.album.clone(),
            preview_url: track.preview_url.clone(),
            duration_ms: track.duration_ms,
            uri: track.uri.clone(),
        }
    }
}

/// Wrong-option candidate: a playlist title with its artists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoy {
    /// Catalog identifier of the track.
    pub id: String,
    /// Title.
    pub name: String,
    /// Artist names.
    pub artists: Vec<String>,
}

impl From<&Track> for Decoy {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artists: track.artists.clone(),
        }
    }
}

impl From<DecoyEntity> for Decoy {
    fn from(entity: DecoyEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            artists: entity.artists,
        }
    }
}

impl From<&Decoy> for DecoyEntity {
    fn from(decoy: &Decoy) -> Self {
        Self {
            id: decoy.id.clone(),
            name: decoy.name.clone(),
            artists: decoy.artists.clone(),
        }
    }
}

/// One recorded answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Track the question was about.
    pub track_id: String,
    /// Canonical title.
    pub correct_answer: String,
    /// Chosen option or the timeout marker.
    pub user_answer: String,
    /// Whether the choice was right.
    pub is_correct: bool,
    /// Milliseconds from question start to submission.
    pub time_to_answer_ms: u64,
}

impl Answer {
    /// Whether the answer was synthesised because the window closed.
    pub fn is_timeout(&self) -> bool {
        self.user_answer == TIMEOUT_ANSWER
    }
}

impl From<AnswerEntity> for Answer {
    fn from(entity: AnswerEntity) -> Self {
        Self {
            track_id: entity.track_id,
            correct_answer: entity.correct_answer,
            user_answer: entity.user_answer,
            is_correct: entity.is_correct,
            time_to_answer_ms: entity.time_to_answer,
        }
    }
}

impl From<&Answer> for AnswerEntity {
    fn from(answer: &Answer) -> Self {
        Self {
            track_id: answer.track_id.clone(),
            correct_answer: answer.correct_answer.clone(),
            user_answer: answer.user_answer.clone(),
            is_correct: answer.is_correct,
            time_to_answer: answer.time_to_answer_ms,
        }
    }
}

/// Lobby member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Identity from the auth provider.
    pub uid: String,
    /// Name shown to the others.
    pub display_name: String,
    /// Avatar URL.
    pub photo_url: Option<String>,
    /// Running total for this playthrough.
    pub score: i64,
    /// Answers in question order.
    pub answers: Vec<Answer>,
    /// Ready flag; meaningless for the host.
    pub is_ready: bool,
}

impl Player {
    /// Number of correct answers so far.
    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|answer| answer.is_correct).count()
    }
}

impl From<PlayerEntity> for Player {
    fn from(entity: PlayerEntity) -> Self {
        Self {
            uid: entity.uid,
            display_name: entity.display_name,
            photo_url: entity.photo_url,
            score: entity.score,
            answers: entity.answers.into_iter().map(Answer::from).collect(),
            is_ready: entity.is_ready,
        }
    }
}

impl From<&Player> for PlayerEntity {
    fn from(player: &Player) -> Self {
        Self {
            uid: player.uid.clone(),
            display_name: player.display_name.clone(),
            photo_url: player.photo_url.clone(),
            score: player.score,
            answers: player.answers.iter().map(AnswerEntity::from).collect(),
            is_ready: player.is_ready,
        }
    }
}

/// Parsed snapshot of one shared lobby document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    /// Document id, doubling as join code.
    pub id: String,
    /// Uid of the host.
    pub host_id: String,
    /// Members keyed by uid, in join order.
    pub players: IndexMap<String, Player>,
    /// Lifecycle status.
    pub status: LobbyStatus,
    /// One track per question.
    pub tracks: Vec<Track>,
    /// Every playable title of the playlist, for wrong options.
    pub decoys: Vec<Decoy>,
    /// Current question.
    pub current_track_index: usize,
    /// Audio source.
    pub playback_mode: PlaybackMode,
    /// Offsets chosen by the host at start.
    pub start_positions: Option<Vec<u64>>,
    /// Membership cap.
    pub max_players: usize,
    /// Creation time (epoch ms).
    pub created_at: Option<u64>,
    /// Start time (epoch ms).
    pub started_at: Option<u64>,
}

impl Lobby {
    /// Parse a pushed or fetched document.
    ///
    /// Missing optional fields take their defaults and duplicate uids collapse onto
    /// the first occurrence. Documents from a newer schema are refused.
    pub fn from_document(id: &str, document: Value) -> Result<Self, SchemaError> {
        let entity: LobbyEntity = serde_json::from_value(document)?;
        Self::from_entity(id, entity)
    }

    /// Build the runtime view from an already deserialised entity.
    pub fn from_entity(id: &str, entity: LobbyEntity) -> Result<Self, SchemaError> {
        if entity.schema_version > LOBBY_SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: entity.schema_version,
                supported: LOBBY_SCHEMA_VERSION,
            });
        }
        if entity.host_id.trim().is_empty() {
            return Err(SchemaError::MissingHost);
        }

        let mut players = IndexMap::with_capacity(entity.players.len());
        for player in entity.players {
            if let Entry::Vacant(slot) = players.entry(player.uid.clone()) {
                slot.insert(Player::from(player));
            }
        }

        Ok(Self {
            id: id.to_owned(),
            host_id: entity.host_id,
            players,
            status: entity.status,
            tracks: entity.tracks.into_iter().map(Track::from).collect(),
            decoys: entity.decoys.into_iter().map(Decoy::from).collect(),
            current_track_index: entity.current_track_index,
            playback_mode: entity.playback_mode,
            start_positions: entity.start_positions,
            max_players: entity.max_players,
            created_at: entity.created_at,
            started_at: entity.started_at,
        })
    }

    /// Document representation, always stamped with the current schema version.
    pub fn to_entity(&self) -> LobbyEntity {
        LobbyEntity {
            schema_version: LOBBY_SCHEMA_VERSION,
            host_id: self.host_id.clone(),
            players: self.players.values().map(PlayerEntity::from).collect(),
            status: self.status,
            tracks: self.tracks.iter().map(TrackEntity::from).collect(),
            decoys: self.decoys.iter().map(DecoyEntity::from).collect(),
            current_track_index: self.current_track_index,
            total_questions: self.tracks.len(),
            playback_mode: self.playback_mode,
            start_positions: self.start_positions.clone(),
            max_players: self.max_players,
            created_at: self.created_at,
            started_at: self.started_at,
        }
    }

    /// Member with the given uid.
    pub fn player(&self, uid: &str) -> Option<&Player> {
        self.players.get(uid)
    }

    /// The host's member entry, if still present.
    pub fn host(&self) -> Option<&Player> {
        self.players.get(&self.host_id)
    }

    /// Whether `uid` is the host.
    pub fn is_host(&self, uid: &str) -> bool {
        self.host_id == uid
    }

    /// Whether the host is no longer a member.
    pub fn is_orphaned(&self) -> bool {
        self.host().is_none()
    }

    /// Number of questions in the game.
    pub fn total_questions(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the current question is the last one.
    pub fn is_last_question(&self) -> bool {
        self.current_track_index + 1 >= self.tracks.len()
    }

    /// Track of the current question.
    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_track_index)
    }

    /// Titles wrong options are drawn from; the question tracks for documents
    /// without a stored pool.
    pub fn distractor_pool(&self) -> Cow<'_, [Decoy]> {
        if self.decoys.is_empty() {
            Cow::Owned(self.tracks.iter().map(Decoy::from).collect())
        } else {
            Cow::Borrowed(self.decoys.as_slice())
        }
    }

    /// Playback offset agreed for `index`; zero when none was recorded.
    pub fn start_offset(&self, index: usize) -> u64 {
        self.start_positions
            .as_ref()
            .and_then(|positions| positions.get(index).copied())
            .unwrap_or(0)
    }

    /// Non-host members that are not ready yet.
    pub fn pending_ready(&self) -> Vec<String> {
        self.players
            .values()
            .filter(|player| !self.is_host(&player.uid) && !player.is_ready)
            .map(|player| player.uid.clone())
            .collect()
    }

    /// Members that still have to answer the current question.
    pub fn pending_answers(&self) -> Vec<String> {
        self.players
            .values()
            .filter(|player| player.answers.len() <= self.current_track_index)
            .map(|player| player.uid.clone())
            .collect()
    }

    /// Whether every member is done with the current question.
    pub fn all_answered_current(&self) -> bool {
        self.pending_answers().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn track(index: usize) -> Track {
        Track {
            id: format!("t{index}"),
            name: format!("Song {index}"),
            artists: vec![format!("Artist {index}")],
            album: "Album".to_owned(),
            preview_url: Some(format!("https://cdn.example/{index}.mp3")),
            duration_ms: 180_000,
            uri: format!("catalog:track:t{index}"),
        }
    }

    pub(crate) fn answer(track_id: &str, is_correct: bool) -> Answer {
        Answer {
            track_id: track_id.to_owned(),
            correct_answer: "Song".to_owned(),
            user_answer: if is_correct { "Song" } else { "Other" }.to_owned(),
            is_correct,
            time_to_answer_ms: 1_000,
        }
    }

    /// Lobby hosted by the first uid with four tracks.
    pub(crate) fn lobby_with(status: LobbyStatus, uids: &[&str]) -> Lobby {
        let players = uids
            .iter()
            .map(|uid| {
                (
                    (*uid).to_owned(),
                    Player {
                        uid: (*uid).to_owned(),
                        display_name: uid.to_uppercase(),
                        photo_url: None,
                        score: 0,
                        answers: vec![],
                        is_ready: false,
                    },
                )
            })
            .collect();
        Lobby {
            id: "LOBBY1".to_owned(),
            host_id: uids[0].to_owned(),
            players,
            status,
            tracks: (0..4).map(track).collect(),
            decoys: Vec::new(),
            current_track_index: 0,
            playback_mode: PlaybackMode::Preview,
            start_positions: None,
            max_players: 8,
            created_at: None,
            started_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn duplicate_players_collapse_onto_first_entry() {
        let lobby = Lobby::from_document(
            "L",
            json!({
                "hostId": "h",
                "players": [
                    {"uid": "h", "displayName": "Host", "score": 10},
                    {"uid": "g", "displayName": "Guest"},
                    {"uid": "h", "displayName": "Impostor", "score": 99},
                ],
            }),
        )
        .unwrap();

        assert_eq!(lobby.players.len(), 2);
        assert_eq!(lobby.player("h").unwrap().display_name, "Host");
        assert_eq!(lobby.player("h").unwrap().score, 10);
    }

    #[test]
    fn newer_schema_and_missing_host_are_refused() {
        let newer = Lobby::from_document("L", json!({"hostId": "h", "schemaVersion": 99}));
        assert!(matches!(
            newer,
            Err(SchemaError::UnsupportedVersion { found: 99, .. })
        ));

        let hostless = Lobby::from_document("L", json!({"hostId": " "}));
        assert!(matches!(hostless, Err(SchemaError::MissingHost)));

        let garbage = Lobby::from_document("L", json!({"players": 3}));
        assert!(matches!(garbage, Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn orphaned_when_host_missing_from_players() {
        let lobby = Lobby::from_document(
            "L",
            json!({"hostId": "h", "players": [{"uid": "g", "displayName": "Guest"}]}),
        )
        .unwrap();
        assert!(lobby.is_orphaned());
    }

    #[test]
    fn entity_round_trip_keeps_total_questions_in_sync() {
        let lobby = test_support::lobby_with(LobbyStatus::Waiting, &["h", "g"]);
        let entity = lobby.to_entity();
        assert_eq!(entity.total_questions, 4);
        assert_eq!(entity.schema_version, LOBBY_SCHEMA_VERSION);
        assert_eq!(Lobby::from_entity("LOBBY1", entity).unwrap(), lobby);
    }

    #[test]
    fn stored_pool_wins_over_question_tracks() {
        let mut lobby = test_support::lobby_with(LobbyStatus::Waiting, &["h"]);
        assert_eq!(lobby.distractor_pool().len(), 4);

        lobby.decoys = (0..10)
            .map(|index| Decoy::from(&test_support::track(index)))
            .collect();
        let pool = lobby.distractor_pool();
        assert_eq!(pool.len(), 10);
        assert!(matches!(pool, Cow::Borrowed(_)));
    }

    #[test]
    fn playable_depends_on_mode() {
        let mut track = test_support::track(0);
        assert!(track.is_playable(PlaybackMode::Preview));
        track.preview_url = None;
        assert!(!track.is_playable(PlaybackMode::Preview));
        assert!(track.is_playable(PlaybackMode::Sdk));
    }
}
