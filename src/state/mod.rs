/// Lobby runtime types and schema parsing.
pub mod lobby;
/// Transition rules of the shared lobby.
pub mod lobby_machine;
/// Client-local lobby memory.
pub mod session;
mod sse;
/// View derivation and question-change detection.
pub mod view;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::session_store::SessionStore,
    error::ServiceError,
    services::{
        catalog::CatalogService,
        playback::{PlaybackBackend, PlaybackSession, RemotePlayback},
    },
};

pub use self::session::LocalLobby;
pub use self::sse::SseHub;

/// Shared handle on the application state.
pub type SharedState = Arc<AppState>;

/// Signed-in player this daemon acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, Validate)]
pub struct Identity {
    /// Stable identity from the auth provider.
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    /// Name shown to other players.
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    /// Avatar URL.
    #[validate(length(max = 2048))]
    pub photo_url: Option<String>,
}

/// Central application state: collaborators, identity and the local lobby memory.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    catalog: Arc<dyn CatalogService>,
    playback: PlaybackSession,
    identity: Identity,
    config: AppConfig,
    sse: SseHub,
    local: Mutex<LocalLobby>,
}

impl AppState {
    /// Construct the state with playback delegated to the UI over SSE.
    ///
    /// The application starts in degraded mode until a session store is installed.
    pub fn new(
        config: AppConfig,
        identity: Identity,
        catalog: Arc<dyn CatalogService>,
    ) -> SharedState {
        let sse = SseHub::new(config.sse_capacity);
        let backend = Arc::new(RemotePlayback::new(sse.clone()));
        Self::build(config, identity, catalog, backend, sse)
    }

    /// Construct the state around a custom playback backend.
    pub fn with_playback_backend(
        config: AppConfig,
        identity: Identity,
        catalog: Arc<dyn CatalogService>,
        backend: Arc<dyn PlaybackBackend>,
    ) -> SharedState {
        let sse = SseHub::new(config.sse_capacity);
        Self::build(config, identity, catalog, backend, sse)
    }

    fn build(
        config: AppConfig,
        identity: Identity,
        catalog: Arc<dyn CatalogService>,
        backend: Arc<dyn PlaybackBackend>,
        sse: SseHub,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            catalog,
            playback: PlaybackSession::new(backend),
            identity,
            config,
            sse,
            local: Mutex::new(LocalLobby::default()),
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store, or [`ServiceError::Degraded`] while none is connected and healthy.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// External music catalog.
    pub fn catalog(&self) -> &Arc<dyn CatalogService> {
        &self.catalog
    }

    /// Playback resource of this client.
    pub fn playback(&self) -> &PlaybackSession {
        &self.playback
    }

    /// Player this daemon acts for.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Gameplay configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast hub feeding the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Lock the client-local lobby memory.
    pub async fn local(&self) -> MutexGuard<'_, LocalLobby> {
        self.local.lock().await
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
