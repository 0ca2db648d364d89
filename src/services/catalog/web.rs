use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    services::catalog::{
        CatalogError, CatalogResult, CatalogService, PlaylistInfo, parse_playlist_id,
    },
    state::lobby::Track,
};

/// Page size requested when listing playlist tracks.
const PAGE_SIZE: usize = 100;

/// HTTP catalog client following `next` cursors until the listing is exhausted.
#[derive(Clone)]
pub struct WebCatalog {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    id: String,
    name: String,
    #[serde(default)]
    tracks: Option<TrackTotal>,
}

#[derive(Debug, Deserialize)]
struct TrackTotal {
    total: usize,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<TrackItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    #[serde(default)]
    track: Option<RemoteTrack>,
}

#[derive(Debug, Deserialize)]
struct RemoteTrack {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<RemoteArtist>,
    #[serde(default)]
    album: Option<RemoteAlbum>,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Deserialize)]
struct RemoteArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RemoteAlbum {
    name: String,
}

impl RemoteTrack {
    fn into_track(self) -> Option<Track> {
        // Local files carry no id and cannot be played by other clients.
        let id = self.id?;
        Some(Track {
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|artist| artist.name).collect(),
            album: self.album.map(|album| album.name).unwrap_or_default(),
            preview_url: self.preview_url.filter(|url| !url.is_empty()),
            duration_ms: self.duration_ms,
            uri: self.uri,
        })
    }
}

impl WebCatalog {
    /// Build a client for the API rooted at `base_url`, authenticating with `token` when set.
    pub fn new(base_url: &str, token: Option<String>) -> CatalogResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CatalogError::Unavailable {
                message: "failed to build catalog client".into(),
                source: Box::new(source),
            })?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: token.map(Arc::from),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        client: Client,
        token: Option<Arc<str>>,
        url: String,
        playlist_id: &str,
    ) -> CatalogResult<T> {
        let mut request = client.get(&url);
        if let Some(token) = token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|source| CatalogError::Unavailable {
                message: format!("GET {url}"),
                source: Box::new(source),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::PlaylistNotFound(playlist_id.to_owned())),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|err| CatalogError::InvalidResponse(err.to_string())),
            status => Err(CatalogError::InvalidResponse(format!(
                "GET {url} answered {status}"
            ))),
        }
    }
}

impl CatalogService for WebCatalog {
    fn resolve_playlist(&self, url: &str) -> BoxFuture<'static, CatalogResult<PlaylistInfo>> {
        let parsed = parse_playlist_id(url).ok_or_else(|| CatalogError::InvalidUrl(url.to_owned()));
        let client = self.client.clone();
        let token = self.token.clone();
        let base_url = self.base_url.clone();
        Box::pin(async move {
            let id = parsed?;
            let endpoint = format!("{base_url}/playlists/{id}?fields=id,name,tracks.total");
            let playlist: PlaylistResponse = Self::get_json(client, token, endpoint, &id).await?;
            Ok(PlaylistInfo {
                id: playlist.id,
                name: playlist.name,
                track_count: playlist.tracks.map(|tracks| tracks.total).unwrap_or(0),
            })
        })
    }

    fn fetch_tracks(
        &self,
        playlist_id: &str,
        include_unplayable: bool,
    ) -> BoxFuture<'static, CatalogResult<Vec<Track>>> {
        let client = self.client.clone();
        let token = self.token.clone();
        let playlist_id = playlist_id.to_owned();
        let mut next = Some(format!(
            "{}/playlists/{playlist_id}/tracks?limit={PAGE_SIZE}",
            self.base_url
        ));
        Box::pin(async move {
            let mut tracks = Vec::new();
            let mut pages = 0usize;
            while let Some(url) = next.take() {
                let page: TracksPage =
                    Self::get_json(client.clone(), token.clone(), url, &playlist_id).await?;
                pages += 1;
                tracks.extend(
                    page.items
                        .into_iter()
                        .filter_map(|item| item.track.and_then(RemoteTrack::into_track))
                        .filter(|track| include_unplayable || track.preview_url.is_some()),
                );
                next = page.next;
            }
            debug!(
                playlist_id = %playlist_id,
                pages,
                tracks = tracks.len(),
                "fetched playlist tracks"
            );
            Ok(tracks)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn page_items_without_id_are_skipped() {
        let page: TracksPage = serde_json::from_value(json!({
            "items": [
                {"track": {"id": "1", "name": "One", "artists": [{"name": "A"}],
                           "album": {"name": "LP"}, "preview_url": "https://p/1",
                           "duration_ms": 1000, "uri": "spotify:track:1"}},
                {"track": {"id": null, "name": "Local file"}},
                {"track": null},
            ],
            "next": null,
        }))
        .unwrap();

        let tracks: Vec<Track> = page
            .items
            .into_iter()
            .filter_map(|item| item.track.and_then(RemoteTrack::into_track))
            .collect();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artists, vec!["A".to_owned()]);
        assert_eq!(tracks[0].album, "LP");
        assert!(page.next.is_none());
    }
}
