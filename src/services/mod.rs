/// Music catalog boundary.
pub mod catalog;
/// Owned background tasks for timers and subscriptions.
pub mod countdown;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-player records written when a game finishes.
pub mod history_service;
/// Lobby intents: create, join, leave, ready, start, answer, advance, finish.
pub mod lobby_service;
/// Playback boundary.
pub mod playback;
/// Question start offsets and distractor selection.
pub mod scheduler;
/// Answer scoring.
pub mod scoring;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Session store connection supervisor.
pub mod storage_supervisor;
/// Reconciliation of pushed lobby documents into local state.
pub mod sync_service;
