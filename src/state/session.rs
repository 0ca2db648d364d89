use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    services::countdown::TaskGuard,
    state::{
        lobby::{Lobby, Track},
        view::{Reconciliation, ViewTracker},
    },
};

/// Result of this client's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AnswerOutcome {
    /// Question index.
    pub index: usize,
    /// Chosen option, or the timeout marker.
    pub user_answer: String,
    /// Title of the track.
    pub correct_answer: String,
    /// Whether the choice was right.
    pub is_correct: bool,
    /// Points credited.
    pub points: i64,
    /// Milliseconds from question start to submission.
    pub time_to_answer_ms: u64,
    /// Whether the answer was synthesised by the countdown.
    pub timed_out: bool,
}

/// Progress of this client's answer to the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerState {
    /// Nothing submitted yet.
    Open,
    /// A submission is being written.
    InFlight,
    /// The answer was recorded.
    Answered(AnswerOutcome),
}

/// Question prepared locally from the shared cursor.
#[derive(Debug, Clone)]
pub struct ActiveQuestion {
    /// Index into the lobby tracks.
    pub index: usize,
    /// Track to guess.
    pub track: Track,
    /// Shuffled options, correct title included once.
    pub options: Vec<String>,
    /// Agreed playback offset.
    pub start_offset_ms: u64,
    /// Local start of the answer window.
    pub started_at: Instant,
    /// Length of the answer window.
    pub window: Duration,
    /// Local answer progress.
    pub answer: AnswerState,
}

impl ActiveQuestion {
    /// Milliseconds since the question was shown.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Whether the answer window has closed.
    pub fn is_expired(&self) -> bool {
        self.started_at.elapsed() > self.window
    }
}

/// Everything one client remembers about the lobby it is in.
///
/// Timers and the subscription loop are owned through [`TaskGuard`]s, so replacing
/// or clearing a field cancels the matching task.
#[derive(Debug, Default)]
pub struct LocalLobby {
    /// Lobby currently joined.
    pub lobby_id: Option<String>,
    /// Last document pushed by the subscription.
    pub snapshot: Option<Lobby>,
    /// View and question-change memory.
    pub tracker: ViewTracker,
    /// Question being answered.
    pub question: Option<ActiveQuestion>,
    /// Wrong options already shown during this playthrough.
    pub used_decoys: HashSet<String>,
    /// Subscription loop of the current lobby.
    pub subscription: Option<TaskGuard>,
    /// Answer countdown of the current question.
    pub countdown: Option<TaskGuard>,
    /// Question index an automatic advance was already scheduled for.
    pub advance_scheduled: Option<usize>,
}

impl LocalLobby {
    /// Whether the client is in the lobby `id`.
    pub fn is_in(&self, id: &str) -> bool {
        self.lobby_id.as_deref() == Some(id)
    }

    /// Drop the current question and cancel its countdown.
    pub fn clear_question(&mut self) {
        self.question = None;
        self.countdown = None;
    }

    /// Forget the lobby and go back to the menu.
    ///
    /// The subscription guard is handed back instead of dropped, so a subscription
    /// loop closing its own lobby can detach itself rather than abort mid-flight.
    pub fn close(&mut self) -> (Reconciliation, Option<TaskGuard>) {
        let subscription = self.subscription.take();
        self.lobby_id = None;
        self.snapshot = None;
        self.clear_question();
        self.used_decoys.clear();
        self.advance_scheduled = None;
        (self.tracker.reset(), subscription)
    }
}
