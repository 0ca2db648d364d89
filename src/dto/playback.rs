use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{services::playback::PlaybackHandle, state::lobby::PlaybackMode};

/// Command asking the UI to load a clip and start it at an offset.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PreparePlaybackEvent {
    /// Handle the UI must echo in its notifications.
    pub handle: PlaybackHandle,
    /// Audio source to use.
    pub mode: PlaybackMode,
    /// Preview URL (preview mode) or catalog URI (SDK mode).
    pub source: String,
    /// Offset into the audio, in milliseconds.
    pub start_offset_ms: u64,
}

/// Command asking the UI to pause a clip.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PausePlaybackEvent {
    /// Clip to pause.
    pub handle: PlaybackHandle,
}

/// Command asking the UI to change the output volume.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VolumeEvent {
    /// Volume between 0 and 1.
    pub volume: f32,
}

/// Notification posted by the UI once a prepared clip is ready or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct PlaybackNoticeRequest {
    /// Handle received in the prepare command.
    pub handle: PlaybackHandle,
    /// Outcome reported by the player.
    pub kind: PlaybackNoticeKind,
    /// Error details when `kind` is `error`.
    #[serde(default)]
    #[validate(length(max = 512))]
    pub message: Option<String>,
}

/// Kind of playback notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackNoticeKind {
    /// The clip is buffered and playing.
    Ready,
    /// The clip could not be played.
    Error,
}

/// Request body for `POST /playback/volume`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct VolumeRequest {
    /// Volume between 0 and 1.
    #[validate(range(min = 0.0, max = 1.0))]
    pub volume: f32,
}
