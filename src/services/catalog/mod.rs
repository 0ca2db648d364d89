//! Boundary with the external music catalog: playlist resolution and track listing.

/// Catalog served from a local JSON file.
pub mod static_catalog;
/// Catalog speaking a Web-API-shaped JSON protocol over HTTP.
#[cfg(feature = "web-catalog")]
pub mod web;

use std::error::Error;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::lobby::Track;

pub use self::static_catalog::StaticCatalog;
#[cfg(feature = "web-catalog")]
pub use self::web::WebCatalog;

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Playlist metadata returned by [`CatalogService::resolve_playlist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlaylistInfo {
    /// Catalog identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Number of tracks, playable or not.
    pub track_count: usize,
}

/// Failures surfaced by catalog backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The text is not a playlist link, URI or id.
    #[error("`{0}` is not a playlist link")]
    InvalidUrl(String),
    /// The catalog does not know the playlist.
    #[error("playlist `{0}` not found")]
    PlaylistNotFound(String),
    /// The catalog could not be reached or answered with an error.
    #[error("catalog request failed: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The catalog answered with an unexpected payload.
    #[error("unexpected catalog response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    /// Whether the error means the user supplied a bad playlist.
    pub fn is_bad_playlist(&self) -> bool {
        matches!(
            self,
            CatalogError::InvalidUrl(_) | CatalogError::PlaylistNotFound(_)
        )
    }
}

/// External catalog consulted once, when a lobby is created.
pub trait CatalogService: Send + Sync {
    /// Resolve a playlist link to its metadata.
    fn resolve_playlist(&self, url: &str) -> BoxFuture<'static, CatalogResult<PlaylistInfo>>;

    /// Every track of the playlist as one flat list, pages followed transparently.
    ///
    /// Tracks without a preview clip are dropped unless `include_unplayable` is set.
    fn fetch_tracks(
        &self,
        playlist_id: &str,
        include_unplayable: bool,
    ) -> BoxFuture<'static, CatalogResult<Vec<Track>>>;
}

/// Extract the playlist id from a share link, a catalog URI, or a bare id.
pub fn parse_playlist_id(input: &str) -> Option<String> {
    let input = input.trim();
    let candidate = if let Some(rest) = input.strip_prefix("spotify:playlist:") {
        rest
    } else if let Some(index) = input.find("/playlist/") {
        let rest = &input[index + "/playlist/".len()..];
        rest.split(['?', '#', '/']).next().unwrap_or_default()
    } else {
        input
    };

    let valid = !candidate.is_empty()
        && candidate.len() <= 64
        && candidate.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| candidate.to_owned())
}
