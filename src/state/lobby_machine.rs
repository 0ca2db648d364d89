use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::lobby::Lobby;

/// Lifecycle status stored in the shared lobby document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    /// Players gather and mark themselves ready.
    #[default]
    Waiting,
    /// Questions are being played.
    Playing,
    /// The last question was answered; scores are final.
    Finished,
}

/// Intents a client can apply to a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Become a member of a waiting lobby.
    Join,
    /// Leave the lobby; the host leaving deletes it.
    Leave,
    /// Flip the ready flag of a non-host member.
    ToggleReady,
    /// Host starts the game once everyone is ready.
    Start,
    /// Member answers the current question.
    SubmitAnswer,
    /// Member's answer window closed without a choice.
    Timeout,
    /// Host moves to the next question or finishes the game.
    Advance,
    /// Host recycles a finished lobby.
    PlayAgain,
    /// Any observer noticed the host is no longer a member.
    HostAbsent,
}

/// Error returned when an event has no transition from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Status the lobby was in when the event was received.
    pub from: LobbyStatus,
    /// The event that cannot be applied from this status.
    pub event: LobbyEvent,
}

/// Reasons the lobby state machine refuses an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The event is not legal from the current status.
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
    /// The lobby already left the waiting room.
    #[error("the game has already started")]
    AlreadyStarted,
    /// The actor is already a member.
    #[error("already a member of this lobby")]
    AlreadyMember,
    /// The lobby reached its member cap.
    #[error("the lobby is full ({max} players)")]
    LobbyFull {
        /// Membership cap of the lobby.
        max: usize,
    },
    /// The actor is not a member of the lobby.
    #[error("not a member of this lobby")]
    NotMember,
    /// Only the host may apply the event.
    #[error("only the host can do that")]
    NotHost,
    /// Some members have not marked themselves ready.
    #[error("waiting for {} player(s) to get ready", pending.len())]
    NotAllReady {
        /// Uids of members that are not ready.
        pending: Vec<String>,
    },
    /// The actor already answered the current question.
    #[error("question {index} was already answered")]
    AlreadyAnswered {
        /// Index of the question.
        index: usize,
    },
    /// The actor's answer list is behind the current question.
    #[error("answer history out of step: expected {expected} answers, found {actual}")]
    AnswerOutOfStep {
        /// Length the answer list must have to answer now.
        expected: usize,
        /// Length observed in the document.
        actual: usize,
    },
    /// Some members have not answered the current question yet.
    #[error("waiting for {} player(s) to answer", pending.len())]
    AnswersPending {
        /// Uids of members still answering.
        pending: Vec<String>,
    },
    /// The host is still a member of the lobby.
    #[error("the host is still present")]
    HostPresent,
}

/// A validated transition. `to == None` means the lobby document must be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status observed when the transition was planned.
    pub from: LobbyStatus,
    /// Status after the transition, or `None` when the lobby goes away.
    pub to: Option<LobbyStatus>,
    /// Event that triggered the transition.
    pub event: LobbyEvent,
}

impl Transition {
    /// Whether applying the transition removes the lobby document.
    pub fn deletes_lobby(&self) -> bool {
        self.to.is_none()
    }

    /// Whether the transition ends the game.
    pub fn finishes_game(&self) -> bool {
        self.to == Some(LobbyStatus::Finished)
    }
}

/// Validate `event` issued by `actor` against the observed `lobby` snapshot.
///
/// Pure: nothing is written. The controller checks every intent here before
/// sending the matching mutation, since the store itself enforces none of these rules.
pub fn plan(lobby: &Lobby, actor: &str, event: LobbyEvent) -> Result<Transition, TransitionError> {
    let from = lobby.status;
    let is_host = lobby.host_id == actor;
    let member = lobby.player(actor);
    let invalid = || TransitionError::Invalid(InvalidTransition { from, event });

    let to = match (from, event) {
        (_, LobbyEvent::HostAbsent) => {
            if !lobby.is_orphaned() {
                return Err(TransitionError::HostPresent);
            }
            None
        }
        (LobbyStatus::Waiting, LobbyEvent::Join) => {
            if member.is_some() {
                return Err(TransitionError::AlreadyMember);
            }
            if lobby.players.len() >= lobby.max_players {
                return Err(TransitionError::LobbyFull {
                    max: lobby.max_players,
                });
            }
            Some(LobbyStatus::Waiting)
        }
        (_, LobbyEvent::Join) => {
            if member.is_some() {
                return Err(TransitionError::AlreadyMember);
            }
            return Err(TransitionError::AlreadyStarted);
        }
        (status, LobbyEvent::Leave) => {
            if member.is_none() {
                return Err(TransitionError::NotMember);
            }
            if is_host { None } else { Some(status) }
        }
        (LobbyStatus::Waiting, LobbyEvent::ToggleReady) => {
            if member.is_none() {
                return Err(TransitionError::NotMember);
            }
            Some(LobbyStatus::Waiting)
        }
        (LobbyStatus::Waiting, LobbyEvent::Start) => {
            if !is_host {
                return Err(TransitionError::NotHost);
            }
            let pending = lobby.pending_ready();
            if !pending.is_empty() {
                return Err(TransitionError::NotAllReady { pending });
            }
            Some(LobbyStatus::Playing)
        }
        (LobbyStatus::Playing, LobbyEvent::SubmitAnswer | LobbyEvent::Timeout) => {
            let Some(player) = member else {
                return Err(TransitionError::NotMember);
            };
            let expected = lobby.current_track_index;
            let actual = player.answers.len();
            if actual > expected {
                return Err(TransitionError::AlreadyAnswered { index: expected });
            }
            if actual < expected {
                return Err(TransitionError::AnswerOutOfStep { expected, actual });
            }
            Some(LobbyStatus::Playing)
        }
        (LobbyStatus::Playing, LobbyEvent::Advance) => {
            if !is_host {
                return Err(TransitionError::NotHost);
            }
            let pending = lobby.pending_answers();
            if !pending.is_empty() {
                return Err(TransitionError::AnswersPending { pending });
            }
            if lobby.is_last_question() {
                Some(LobbyStatus::Finished)
            } else {
                Some(LobbyStatus::Playing)
            }
        }
        (LobbyStatus::Finished, LobbyEvent::PlayAgain) => {
            if !is_host {
                return Err(TransitionError::NotHost);
            }
            Some(LobbyStatus::Waiting)
        }
        _ => return Err(invalid()),
    };

    Ok(Transition { from, to, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::test_support::{answer, lobby_with};

    #[test]
    fn join_appends_only_while_waiting() {
        let lobby = lobby_with(LobbyStatus::Waiting, &["host"]);
        let transition = plan(&lobby, "guest", LobbyEvent::Join).unwrap();
        assert_eq!(transition.to, Some(LobbyStatus::Waiting));

        let playing = lobby_with(LobbyStatus::Playing, &["host"]);
        assert_eq!(
            plan(&playing, "guest", LobbyEvent::Join).unwrap_err(),
            TransitionError::AlreadyStarted
        );
    }

    #[test]
    fn join_by_member_is_reported_as_already_member() {
        let lobby = lobby_with(LobbyStatus::Playing, &["host", "guest"]);
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::Join).unwrap_err(),
            TransitionError::AlreadyMember
        );
    }

    #[test]
    fn join_respects_member_cap() {
        let mut lobby = lobby_with(LobbyStatus::Waiting, &["host", "a"]);
        lobby.max_players = 2;
        assert_eq!(
            plan(&lobby, "b", LobbyEvent::Join).unwrap_err(),
            TransitionError::LobbyFull { max: 2 }
        );
    }

    #[test]
    fn host_leaving_deletes_lobby() {
        let lobby = lobby_with(LobbyStatus::Playing, &["host", "guest"]);
        assert!(plan(&lobby, "host", LobbyEvent::Leave).unwrap().deletes_lobby());
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::Leave).unwrap().to,
            Some(LobbyStatus::Playing)
        );
        assert_eq!(
            plan(&lobby, "stranger", LobbyEvent::Leave).unwrap_err(),
            TransitionError::NotMember
        );
    }

    #[test]
    fn start_requires_host_and_ready_members() {
        let mut lobby = lobby_with(LobbyStatus::Waiting, &["host", "a", "b"]);
        assert_eq!(
            plan(&lobby, "a", LobbyEvent::Start).unwrap_err(),
            TransitionError::NotHost
        );
        lobby.players.get_mut("a").unwrap().is_ready = true;
        assert_eq!(
            plan(&lobby, "host", LobbyEvent::Start).unwrap_err(),
            TransitionError::NotAllReady {
                pending: vec!["b".to_owned()]
            }
        );
        lobby.players.get_mut("b").unwrap().is_ready = true;
        assert_eq!(
            plan(&lobby, "host", LobbyEvent::Start).unwrap().to,
            Some(LobbyStatus::Playing)
        );
    }

    #[test]
    fn answer_requires_matching_answer_count() {
        let mut lobby = lobby_with(LobbyStatus::Playing, &["host", "guest"]);
        assert!(plan(&lobby, "guest", LobbyEvent::SubmitAnswer).is_ok());

        lobby.players.get_mut("guest").unwrap().answers.push(answer("t0", true));
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::SubmitAnswer).unwrap_err(),
            TransitionError::AlreadyAnswered { index: 0 }
        );
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::Timeout).unwrap_err(),
            TransitionError::AlreadyAnswered { index: 0 }
        );

        lobby.current_track_index = 2;
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::SubmitAnswer).unwrap_err(),
            TransitionError::AnswerOutOfStep {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn advance_waits_for_every_member_then_finishes_on_last_track() {
        let mut lobby = lobby_with(LobbyStatus::Playing, &["host", "guest"]);
        lobby.players.get_mut("host").unwrap().answers.push(answer("t0", true));
        assert_eq!(
            plan(&lobby, "host", LobbyEvent::Advance).unwrap_err(),
            TransitionError::AnswersPending {
                pending: vec!["guest".to_owned()]
            }
        );

        lobby.players.get_mut("guest").unwrap().answers.push(answer("t0", false));
        assert_eq!(
            plan(&lobby, "host", LobbyEvent::Advance).unwrap().to,
            Some(LobbyStatus::Playing)
        );
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::Advance).unwrap_err(),
            TransitionError::NotHost
        );

        lobby.current_track_index = lobby.tracks.len() - 1;
        for player in lobby.players.values_mut() {
            while player.answers.len() < lobby.tracks.len() {
                player.answers.push(answer("t", true));
            }
        }
        assert!(
            plan(&lobby, "host", LobbyEvent::Advance)
                .unwrap()
                .finishes_game()
        );
    }

    #[test]
    fn play_again_only_from_finished() {
        let lobby = lobby_with(LobbyStatus::Finished, &["host", "guest"]);
        assert_eq!(
            plan(&lobby, "host", LobbyEvent::PlayAgain).unwrap().to,
            Some(LobbyStatus::Waiting)
        );

        let waiting = lobby_with(LobbyStatus::Waiting, &["host"]);
        let err = plan(&waiting, "host", LobbyEvent::PlayAgain).unwrap_err();
        match err {
            TransitionError::Invalid(invalid) => {
                assert_eq!(invalid.from, LobbyStatus::Waiting);
                assert_eq!(invalid.event, LobbyEvent::PlayAgain);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn host_absent_only_when_orphaned() {
        let mut lobby = lobby_with(LobbyStatus::Waiting, &["host", "guest"]);
        assert_eq!(
            plan(&lobby, "guest", LobbyEvent::HostAbsent).unwrap_err(),
            TransitionError::HostPresent
        );
        lobby.players.shift_remove("host");
        assert!(
            plan(&lobby, "guest", LobbyEvent::HostAbsent)
                .unwrap()
                .deletes_lobby()
        );
    }
}
