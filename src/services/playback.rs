//! Playback boundary: one owned session per client instead of a global player handle.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::{
    dto::{
        playback::{
            PausePlaybackEvent, PlaybackNoticeKind, PlaybackNoticeRequest, PreparePlaybackEvent,
            VolumeEvent,
        },
        sse::ServerEvent,
    },
    state::{
        SseHub,
        lobby::{PlaybackMode, Track},
    },
};

const EVENT_PLAYBACK_PREPARE: &str = "playback.prepare";
const EVENT_PLAYBACK_PAUSE: &str = "playback.pause";
const EVENT_PLAYBACK_VOLUME: &str = "playback.volume";

/// Identifies one prepared clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PlaybackHandle(pub u64);

/// Clip to prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    /// Audio source.
    pub mode: PlaybackMode,
    /// Preview URL or catalog URI, depending on `mode`.
    pub source: String,
    /// Offset into the audio.
    pub start_offset_ms: u64,
}

impl PlaybackRequest {
    /// Request for `track` in `mode`, or `None` when the track has nothing to play.
    pub fn for_track(mode: PlaybackMode, track: &Track, start_offset_ms: u64) -> Option<Self> {
        let source = match mode {
            PlaybackMode::Preview => track.preview_url.clone().filter(|url| !url.is_empty())?,
            PlaybackMode::Sdk => Some(track.uri.clone()).filter(|uri| !uri.is_empty())?,
        };
        Some(Self {
            mode,
            source,
            start_offset_ms,
        })
    }
}

/// Failures of the playback collaborator.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The session was released (the client left multiplayer mode).
    #[error("playback session is not active")]
    Inactive,
    /// The backend could not prepare or control the clip.
    #[error("playback failed: {0}")]
    Backend(String),
    /// Volume outside `[0, 1]`.
    #[error("volume must be between 0 and 1, got {0}")]
    InvalidVolume(f32),
}

/// Asynchronous notification about a prepared clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackNotice {
    /// The clip is playing.
    Ready(PlaybackHandle),
    /// The clip failed.
    Error {
        /// Clip concerned.
        handle: PlaybackHandle,
        /// Failure description.
        message: String,
    },
}

impl From<PlaybackNoticeRequest> for PlaybackNotice {
    fn from(request: PlaybackNoticeRequest) -> Self {
        match request.kind {
            PlaybackNoticeKind::Ready => PlaybackNotice::Ready(request.handle),
            PlaybackNoticeKind::Error => PlaybackNotice::Error {
                handle: request.handle,
                message: request.message.unwrap_or_else(|| "unknown error".into()),
            },
        }
    }
}

/// Device or SDK actually producing sound.
pub trait PlaybackBackend: Send + Sync {
    /// Load a clip and start it at the requested offset.
    fn prepare(&self, request: PlaybackRequest)
    -> BoxFuture<'static, Result<PlaybackHandle, PlaybackError>>;
    /// Pause a clip.
    fn pause(&self, handle: PlaybackHandle) -> BoxFuture<'static, Result<(), PlaybackError>>;
    /// Change the output volume.
    fn set_volume(&self, volume: f32) -> BoxFuture<'static, Result<(), PlaybackError>>;
}

/// Backend delegating playback to the UI: commands go out on the SSE stream and
/// the UI reports back through `POST /playback/events`.
pub struct RemotePlayback {
    hub: SseHub,
    next_handle: AtomicU64,
}

impl RemotePlayback {
    /// Backend pushing commands onto `hub`.
    pub fn new(hub: SseHub) -> Self {
        Self {
            hub,
            next_handle: AtomicU64::new(1),
        }
    }

    fn send<T: Serialize>(&self, event: &str, payload: &T) -> Result<(), PlaybackError> {
        let event = ServerEvent::json(Some(event.to_owned()), payload)
            .map_err(|err| PlaybackError::Backend(err.to_string()))?;
        self.hub.broadcast(event);
        Ok(())
    }
}

impl PlaybackBackend for RemotePlayback {
    fn prepare(
        &self,
        request: PlaybackRequest,
    ) -> BoxFuture<'static, Result<PlaybackHandle, PlaybackError>> {
        let handle = PlaybackHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let result = self
            .send(
                EVENT_PLAYBACK_PREPARE,
                &PreparePlaybackEvent {
                    handle,
                    mode: request.mode,
                    source: request.source,
                    start_offset_ms: request.start_offset_ms,
                },
            )
            .map(|()| handle);
        Box::pin(async move { result })
    }

    fn pause(&self, handle: PlaybackHandle) -> BoxFuture<'static, Result<(), PlaybackError>> {
        let result = self.send(EVENT_PLAYBACK_PAUSE, &PausePlaybackEvent { handle });
        Box::pin(async move { result })
    }

    fn set_volume(&self, volume: f32) -> BoxFuture<'static, Result<(), PlaybackError>> {
        let result = self.send(EVENT_PLAYBACK_VOLUME, &VolumeEvent { volume });
        Box::pin(async move { result })
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    active: bool,
    current: Option<PlaybackHandle>,
}

/// Single owned playback resource of a client.
///
/// Acquired when the client enters a lobby and released when it leaves; at most
/// one clip plays at a time and releasing always pauses it.
pub struct PlaybackSession {
    backend: Arc<dyn PlaybackBackend>,
    slot: Mutex<SessionSlot>,
    notices: broadcast::Sender<PlaybackNotice>,
}

impl PlaybackSession {
    /// Session driving `backend`, initially released.
    pub fn new(backend: Arc<dyn PlaybackBackend>) -> Self {
        let (notices, _rx) = broadcast::channel(16);
        Self {
            backend,
            slot: Mutex::new(SessionSlot::default()),
            notices,
        }
    }

    /// Mark the session as owned by the current lobby.
    pub async fn acquire(&self) {
        self.slot.lock().await.active = true;
    }

    /// Pause whatever plays and give the session up.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        slot.active = false;
        if let Some(handle) = slot.current.take()
            && let Err(err) = self.backend.pause(handle).await
        {
            warn!(handle = handle.0, error = %err, "failed to pause playback on release");
        }
    }

    /// Whether the session is currently acquired.
    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.active
    }

    /// Clip currently owned by the session.
    pub async fn current(&self) -> Option<PlaybackHandle> {
        self.slot.lock().await.current
    }

    /// Replace the current clip with `request`.
    pub async fn play(&self, request: PlaybackRequest) -> Result<PlaybackHandle, PlaybackError> {
        let mut slot = self.slot.lock().await;
        if !slot.active {
            return Err(PlaybackError::Inactive);
        }
        if let Some(previous) = slot.current.take()
            && let Err(err) = self.backend.pause(previous).await
        {
            warn!(handle = previous.0, error = %err, "failed to pause previous clip");
        }
        let handle = self.backend.prepare(request).await?;
        debug!(handle = handle.0, "playback prepared");
        slot.current = Some(handle);
        Ok(handle)
    }

    /// Pause the current clip, keeping the session acquired.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let mut slot = self.slot.lock().await;
        match slot.current.take() {
            Some(handle) => self.backend.pause(handle).await,
            None => Ok(()),
        }
    }

    /// Change the output volume.
    pub async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        self.backend.set_volume(volume).await
    }

    /// Record a notification from the backend and fan it out.
    pub async fn report(&self, notice: PlaybackNotice) {
        let current = self.current().await;
        match &notice {
            PlaybackNotice::Ready(handle) => {
                debug!(handle = handle.0, "playback ready");
            }
            PlaybackNotice::Error { handle, message } if current == Some(*handle) => {
                warn!(handle = handle.0, error = %message, "current clip failed to play");
            }
            PlaybackNotice::Error { handle, message } => {
                debug!(handle = handle.0, error = %message, "stale clip reported an error");
            }
        }
        let _ = self.notices.send(notice);
    }

    /// Subscribe to ready/error notifications.
    pub fn notices(&self) -> broadcast::Receiver<PlaybackNotice> {
        self.notices.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingBackend {
        calls: StdMutex<Vec<String>>,
        next: AtomicU64,
    }

    impl PlaybackBackend for RecordingBackend {
        fn prepare(
            &self,
            request: PlaybackRequest,
        ) -> BoxFuture<'static, Result<PlaybackHandle, PlaybackError>> {
            let handle = PlaybackHandle(self.next.fetch_add(1, Ordering::SeqCst));
            self.calls
                .lock()
                .unwrap()
                .push(format!("prepare {} @{}", request.source, request.start_offset_ms));
            Box::pin(async move { Ok(handle) })
        }

        fn pause(&self, handle: PlaybackHandle) -> BoxFuture<'static, Result<(), PlaybackError>> {
            self.calls.lock().unwrap().push(format!("pause {}", handle.0));
            Box::pin(async { Ok(()) })
        }

        fn set_volume(&self, volume: f32) -> BoxFuture<'static, Result<(), PlaybackError>> {
            self.calls.lock().unwrap().push(format!("volume {volume}"));
            Box::pin(async { Ok(()) })
        }
    }

    fn request(source: &str) -> PlaybackRequest {
        PlaybackRequest {
            mode: PlaybackMode::Preview,
            source: source.to_owned(),
            start_offset_ms: 0,
        }
    }

    #[tokio::test]
    async fn released_session_refuses_to_play() {
        let session = PlaybackSession::new(Arc::new(RecordingBackend::default()));
        assert!(matches!(
            session.play(request("a")).await,
            Err(PlaybackError::Inactive)
        ));
    }

    #[tokio::test]
    async fn new_clip_pauses_previous_and_release_pauses_current() {
        let backend = Arc::new(RecordingBackend::default());
        let session = PlaybackSession::new(backend.clone());
        session.acquire().await;

        session.play(request("a")).await.unwrap();
        session.play(request("b")).await.unwrap();
        session.release().await;

        assert!(!session.is_active().await);
        assert_eq!(session.current().await, None);
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["prepare a @0", "pause 0", "prepare b @0", "pause 1"]
        );
    }

    #[tokio::test]
    async fn volume_is_range_checked() {
        let session = PlaybackSession::new(Arc::new(RecordingBackend::default()));
        assert!(matches!(
            session.set_volume(1.5).await,
            Err(PlaybackError::InvalidVolume(_))
        ));
        session.set_volume(0.5).await.unwrap();
    }

    #[test]
    fn requests_pick_the_source_matching_the_mode() {
        let track = Track {
            id: "t".into(),
            name: "Song".into(),
            artists: vec![],
            album: String::new(),
            preview_url: None,
            duration_ms: 1,
            uri: "catalog:track:t".into(),
        };
        assert!(PlaybackRequest::for_track(PlaybackMode::Preview, &track, 0).is_none());
        let sdk = PlaybackRequest::for_track(PlaybackMode::Sdk, &track, 42).unwrap();
        assert_eq!(sdk.source, "catalog:track:t");
        assert_eq!(sdk.start_offset_ms, 42);
    }
}
