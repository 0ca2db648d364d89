use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    dao::{
        epoch_millis,
        models::{AnswerEntity, HistoryRecordEntity, LOBBY_SCHEMA_VERSION, ProfileEntity},
        session_store::{
            DocumentQuery, DocumentUpdate, HISTORY_COLLECTION, PROFILE_COLLECTION, SessionStore,
            SortDirection,
        },
        storage::{StorageError, StorageResult},
    },
    dto::lobby::LeaderboardEntry,
    state::lobby::{Lobby, Player},
};

/// Outcome of the per-player writes performed when a game finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct FinishReport {
    /// Lobby whose results were recorded.
    pub lobby_id: String,
    /// Players whose history record and profile were both written.
    pub written: Vec<String>,
    /// Players for which at least one write failed.
    pub failed: Vec<String>,
}

impl FinishReport {
    /// Whether every player's results were stored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Build the history record of `player` for the finished `lobby`.
pub fn history_record(lobby: &Lobby, player: &Player, played_at: u64) -> HistoryRecordEntity {
    HistoryRecordEntity {
        schema_version: LOBBY_SCHEMA_VERSION,
        uid: player.uid.clone(),
        display_name: player.display_name.clone(),
        lobby_id: lobby.id.clone(),
        score: player.score,
        correct_count: player.correct_count(),
        total_questions: lobby.total_questions(),
        playback_mode: lobby.playback_mode,
        played_at,
        answers: player.answers.iter().map(AnswerEntity::from).collect(),
    }
}

/// Aggregate increment applied to `profiles/{uid}` for one finished game.
pub fn profile_update(player: &Player) -> DocumentUpdate {
    DocumentUpdate::new()
        .increment("totalScore", player.score)
        .increment("gamesPlayed", 1)
        .increment("correctAnswers", player.correct_count() as i64)
        .set("displayName", player.display_name.clone())
        .set("photoURL", json!(player.photo_url))
        .server_timestamp("updatedAt")
        .upsert()
}

/// Write one history record and one profile increment per player of `lobby`.
///
/// Every player is attempted independently; failures are logged and reported
/// but never undo the finished status.
pub async fn record_results(store: Arc<dyn SessionStore>, lobby: &Lobby) -> FinishReport {
    let played_at = epoch_millis();
    let mut report = FinishReport {
        lobby_id: lobby.id.clone(),
        ..FinishReport::default()
    };

    for player in lobby.players.values() {
        match record_player(store.as_ref(), lobby, player, played_at).await {
            Ok(()) => report.written.push(player.uid.clone()),
            Err(err) => {
                warn!(
                    lobby_id = %lobby.id,
                    uid = %player.uid,
                    error = %err,
                    "failed to record game results"
                );
                report.failed.push(player.uid.clone());
            }
        }
    }

    info!(
        lobby_id = %lobby.id,
        written = report.written.len(),
        failed = report.failed.len(),
        "recorded game results"
    );
    report
}

async fn record_player(
    store: &dyn SessionStore,
    lobby: &Lobby,
    player: &Player,
    played_at: u64,
) -> StorageResult<()> {
    let record = history_record(lobby, player, played_at);
    let document = serde_json::to_value(&record).map_err(|err| {
        StorageError::unavailable("failed to encode history record".into(), err)
    })?;
    store.create_document(HISTORY_COLLECTION, document).await?;
    store
        .update_document(PROFILE_COLLECTION, &player.uid, profile_update(player))
        .await
}

/// Top profiles ordered by total score.
pub async fn leaderboard(
    store: Arc<dyn SessionStore>,
    limit: usize,
) -> StorageResult<Vec<LeaderboardEntry>> {
    let query = DocumentQuery::all()
        .order_by("totalScore", SortDirection::Descending)
        .limit(limit);
    let documents = store.query_documents(PROFILE_COLLECTION, query).await?;

    let entries = documents
        .into_iter()
        .filter_map(|document| {
            match serde_json::from_value::<ProfileEntity>(document.data) {
                Ok(profile) => Some((document.id, profile)),
                Err(err) => {
                    warn!(uid = %document.id, error = %err, "skipping malformed profile");
                    None
                }
            }
        })
        .enumerate()
        .map(|(position, (uid, profile))| LeaderboardEntry {
            rank: position + 1,
            uid,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            total_score: profile.total_score,
            games_played: profile.games_played,
            correct_answers: profile.correct_answers,
        })
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{
        dao::session_store::MemorySessionStore,
        state::{
            lobby::test_support::{answer, lobby_with},
            lobby_machine::LobbyStatus,
        },
    };

    fn finished_lobby() -> Lobby {
        let mut lobby = lobby_with(LobbyStatus::Finished, &["host", "guest"]);
        if let Some(host) = lobby.players.get_mut("host") {
            host.score = 2400;
            host.answers = vec![answer("t0", true), answer("t1", true), answer("t2", false)];
        }
        if let Some(guest) = lobby.players.get_mut("guest") {
            guest.score = 1100;
            guest.answers = vec![answer("t0", true), answer("t1", false), answer("t2", false)];
        }
        lobby
    }

    #[test]
    fn history_record_counts_correct_answers() {
        let lobby = finished_lobby();
        let record = history_record(&lobby, &lobby.players["host"], 42);
        assert_eq!(record.correct_count, 2);
        assert_eq!(record.score, 2400);
        assert_eq!(record.answers.len(), 3);
        assert_eq!(record.total_questions, lobby.total_questions());
        assert_eq!(record.played_at, 42);
    }

    #[tokio::test]
    async fn results_accumulate_into_profiles() {
        let store = Arc::new(MemorySessionStore::new());
        let lobby = finished_lobby();

        let first = record_results(store.clone(), &lobby).await;
        assert!(first.is_complete());
        assert_eq!(first.written.len(), 2);
        record_results(store.clone(), &lobby).await;

        let profile = store
            .get_document(PROFILE_COLLECTION, "host")
            .await
            .unwrap()
            .unwrap();
        let profile: ProfileEntity = serde_json::from_value(profile).unwrap();
        assert_eq!(profile.total_score, 4800);
        assert_eq!(profile.games_played, 2);
        assert_eq!(profile.correct_answers, 4);

        let history = store
            .query_documents(HISTORY_COLLECTION, DocumentQuery::all().where_eq("uid", "guest"))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data["score"], Value::from(1100));
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_total_score() {
        let store = Arc::new(MemorySessionStore::new());
        record_results(store.clone(), &finished_lobby()).await;

        let entries = leaderboard(store, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uid, "host");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].uid, "guest");
        assert_eq!(entries[1].rank, 2);
    }
}
