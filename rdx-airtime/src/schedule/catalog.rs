//! Read-only view of the tracks and playlists the station can air.

use super::store::StoreResult;
use crate::common::{PlaylistId, TrackId};
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A playable track as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    #[serde(default)]
    pub title: String,
    pub duration_secs: i64,
}

impl TrackInfo {
    /// Tracks without a positive duration can never be scheduled.
    pub fn is_eligible(&self) -> bool {
        self.duration_secs > 0
    }
}

/// An ordered list of tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: PlaylistId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<TrackId>,
}

#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn track(&self, id: TrackId) -> StoreResult<Option<TrackInfo>>;

    /// Member tracks of a playlist in play order, or `None` if the playlist
    /// is unknown.
    async fn playlist_tracks(&self, id: PlaylistId) -> StoreResult<Option<Vec<TrackId>>>;

    /// Any track with a strictly positive duration.
    async fn random_eligible_track(&self) -> StoreResult<Option<TrackId>>;

    async fn duration_secs(&self, id: TrackId) -> StoreResult<Option<i64>> {
        Ok(self.track(id).await?.map(|track| track.duration_secs))
    }
}

/// A [`TrackCatalog`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tracks: RwLock<HashMap<TrackId, TrackInfo>>,
    playlists: RwLock<HashMap<PlaylistId, PlaylistInfo>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(
        tracks: impl IntoIterator<Item = TrackInfo>,
        playlists: impl IntoIterator<Item = PlaylistInfo>,
    ) -> Self {
        Self {
            tracks: RwLock::new(tracks.into_iter().map(|track| (track.id, track)).collect()),
            playlists: RwLock::new(
                playlists
                    .into_iter()
                    .map(|playlist| (playlist.id, playlist))
                    .collect(),
            ),
        }
    }

    pub async fn add_track(&self, track: TrackInfo) {
        self.tracks.write().await.insert(track.id, track);
    }

    pub async fn add_playlist(&self, playlist: PlaylistInfo) {
        self.playlists.write().await.insert(playlist.id, playlist);
    }

    /// All tracks ordered by id.
    pub async fn tracks(&self) -> Vec<TrackInfo> {
        let mut tracks: Vec<_> = self.tracks.read().await.values().cloned().collect();
        tracks.sort_by_key(|track| track.id);
        tracks
    }

    /// All playlists ordered by id.
    pub async fn playlists(&self) -> Vec<PlaylistInfo> {
        let mut playlists: Vec<_> = self.playlists.read().await.values().cloned().collect();
        playlists.sort_by_key(|playlist| playlist.id);
        playlists
    }
}

#[async_trait]
impl TrackCatalog for MemoryCatalog {
    async fn track(&self, id: TrackId) -> StoreResult<Option<TrackInfo>> {
        Ok(self.tracks.read().await.get(&id).cloned())
    }

    async fn playlist_tracks(&self, id: PlaylistId) -> StoreResult<Option<Vec<TrackId>>> {
        Ok(self
            .playlists
            .read()
            .await
            .get(&id)
            .map(|playlist| playlist.tracks.clone()))
    }

    async fn random_eligible_track(&self) -> StoreResult<Option<TrackId>> {
        let tracks = self.tracks.read().await;
        let chosen = tracks
            .values()
            .filter(|track| track.is_eligible())
            .map(|track| track.id)
            .choose(&mut rand::thread_rng());
        Ok(chosen)
    }
}
