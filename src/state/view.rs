use serde::Serialize;
use utoipa::ToSchema;

use crate::state::lobby_machine::LobbyStatus;

/// Screen the local UI should show, derived from the lobby document alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Not in a lobby.
    #[default]
    Menu,
    /// Waiting room.
    Lobby,
    /// Answering questions.
    Playing,
    /// Final scores.
    Results,
}

impl View {
    /// View matching an observed document status; `None` means the lobby is gone.
    pub fn for_status(status: Option<LobbyStatus>) -> Self {
        match status {
            None => View::Menu,
            Some(LobbyStatus::Waiting) => View::Lobby,
            Some(LobbyStatus::Playing) => View::Playing,
            Some(LobbyStatus::Finished) => View::Results,
        }
    }
}

/// What the subscription handler must do after observing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// View before the document was observed.
    pub previous: View,
    /// View derived from the document.
    pub current: View,
    /// Question index to prepare, if the current question changed.
    pub prepare: Option<usize>,
}

impl Reconciliation {
    /// Whether the view changed.
    pub fn view_changed(&self) -> bool {
        self.previous != self.current
    }

    /// Whether the local client just left the playing view.
    pub fn left_playing(&self) -> bool {
        self.previous == View::Playing && self.current != View::Playing
    }
}

/// Controller-local memory used to detect question changes.
///
/// The only state kept between pushes is the current view and the last prepared
/// question index. The index is forgotten every time the view enters `playing`,
/// so the first delivery of a playthrough always prepares its question.
#[derive(Debug, Default, Clone)]
pub struct ViewTracker {
    view: View,
    last_prepared: Option<usize>,
}

impl ViewTracker {
    /// Tracker starting on the menu.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view.
    pub fn view(&self) -> View {
        self.view
    }

    /// Last question index handed out for preparation.
    pub fn last_prepared(&self) -> Option<usize> {
        self.last_prepared
    }

    /// Fold one observed document (its status and cursor) into local memory.
    pub fn observe(&mut self, status: Option<LobbyStatus>, current_index: usize) -> Reconciliation {
        let previous = self.view;
        let current = View::for_status(status);

        if current != View::Playing || previous != View::Playing {
            self.last_prepared = None;
        }

        let prepare = if current == View::Playing && self.last_prepared != Some(current_index) {
            self.last_prepared = Some(current_index);
            Some(current_index)
        } else {
            None
        };

        self.view = current;
        Reconciliation {
            previous,
            current,
            prepare,
        }
    }

    /// Return to the menu, forgetting everything.
    pub fn reset(&mut self) -> Reconciliation {
        self.observe(None, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_index_twice_prepares_once() {
        let mut tracker = ViewTracker::new();
        let first = tracker.observe(Some(LobbyStatus::Playing), 0);
        let second = tracker.observe(Some(LobbyStatus::Playing), 0);

        assert_eq!(first.prepare, Some(0));
        assert!(first.view_changed());
        assert_eq!(second.prepare, None);
        assert!(!second.view_changed());
    }

    #[test]
    fn consecutive_indices_prepare_in_order() {
        let mut tracker = ViewTracker::new();
        tracker.observe(Some(LobbyStatus::Waiting), 0);

        let prepared: Vec<usize> = [0, 0, 1, 1, 2]
            .into_iter()
            .filter_map(|index| tracker.observe(Some(LobbyStatus::Playing), index).prepare)
            .collect();
        assert_eq!(prepared, vec![0, 1, 2]);
    }

    #[test]
    fn skipped_indices_are_not_assumed_sequential() {
        let mut tracker = ViewTracker::new();
        tracker.observe(Some(LobbyStatus::Playing), 0);
        assert_eq!(tracker.observe(Some(LobbyStatus::Playing), 3).prepare, Some(3));
    }

    #[test]
    fn first_delivery_after_entering_playing_always_prepares() {
        let mut tracker = ViewTracker::new();
        tracker.observe(Some(LobbyStatus::Playing), 0);
        tracker.observe(Some(LobbyStatus::Finished), 0);
        tracker.observe(Some(LobbyStatus::Waiting), 0);

        let replay = tracker.observe(Some(LobbyStatus::Playing), 0);
        assert_eq!(replay.prepare, Some(0));
        assert_eq!(replay.previous, View::Lobby);
    }

    #[test]
    fn deletion_moves_to_menu_once() {
        let mut tracker = ViewTracker::new();
        tracker.observe(Some(LobbyStatus::Playing), 1);

        let gone = tracker.observe(None, 0);
        assert!(gone.view_changed());
        assert!(gone.left_playing());
        assert_eq!(gone.current, View::Menu);

        assert!(!tracker.observe(None, 0).view_changed());
    }
}
