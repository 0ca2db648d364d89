use std::{fs, path::Path, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;

use crate::{
    dao::models::TrackEntity,
    services::catalog::{
        CatalogError, CatalogResult, CatalogService, PlaylistInfo, parse_playlist_id,
    },
    state::lobby::Track,
};

/// Playlist entry of the JSON file read by [`StaticCatalog`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticPlaylist {
    /// Playlist id matched against parsed links.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Tracks in playlist order.
    #[serde(default)]
    pub tracks: Vec<TrackEntity>,
}

#[derive(Debug, Deserialize)]
struct StaticCatalogFile {
    playlists: Vec<StaticPlaylist>,
}

/// Catalog answering from playlists loaded once, typically from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    playlists: Arc<IndexMap<String, StaticPlaylist>>,
}

impl StaticCatalog {
    /// Catalog over the given playlists.
    pub fn new(playlists: impl IntoIterator<Item = StaticPlaylist>) -> Self {
        let playlists = playlists
            .into_iter()
            .map(|playlist| (playlist.id.clone(), playlist))
            .collect();
        Self {
            playlists: Arc::new(playlists),
        }
    }

    /// Load `{"playlists": [...]}` from `path`.
    pub fn from_file(path: &Path) -> CatalogResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Unavailable {
            message: format!("failed to read catalog file `{}`", path.display()),
            source: Box::new(source),
        })?;
        let file: StaticCatalogFile = serde_json::from_str(&contents)
            .map_err(|err| CatalogError::InvalidResponse(err.to_string()))?;
        info!(
            path = %path.display(),
            playlists = file.playlists.len(),
            "loaded static catalog"
        );
        Ok(Self::new(file.playlists))
    }

    fn lookup(&self, url: &str) -> CatalogResult<&StaticPlaylist> {
        let id = parse_playlist_id(url).ok_or_else(|| CatalogError::InvalidUrl(url.to_owned()))?;
        self.playlists
            .get(&id)
            .ok_or(CatalogError::PlaylistNotFound(id))
    }
}

impl CatalogService for StaticCatalog {
    fn resolve_playlist(&self, url: &str) -> BoxFuture<'static, CatalogResult<PlaylistInfo>> {
        let result = self.lookup(url).map(|playlist| PlaylistInfo {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            track_count: playlist.tracks.len(),
        });
        Box::pin(async move { result })
    }

    fn fetch_tracks(
        &self,
        playlist_id: &str,
        include_unplayable: bool,
    ) -> BoxFuture<'static, CatalogResult<Vec<Track>>> {
        let result = self.lookup(playlist_id).map(|playlist| {
            playlist
                .tracks
                .iter()
                .cloned()
                .map(Track::from)
                .filter(|track| include_unplayable || track.preview_url.is_some())
                .collect()
        });
        Box::pin(async move { result })
    }
}
