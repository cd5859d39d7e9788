//! Strategies for choosing filler content when the timeline runs dry.

use crate::common::{PlaylistId, TrackId};
use crate::config::AutofillPolicy;
use crate::schedule::catalog::TrackCatalog;
use crate::schedule::store::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Picks a track to extend an empty timeline with.
///
/// `None` means there is nothing suitable; the timeline then stays empty,
/// which is not an error.
#[async_trait]
pub trait AutofillStrategy: Send + Sync {
    async fn choose_track_for_autofill(&self, now: DateTime<Utc>) -> StoreResult<Option<TrackId>>;
}

/// Any catalog track with a positive duration.
pub struct RandomAutofill {
    catalog: Arc<dyn TrackCatalog>,
}

impl RandomAutofill {
    pub fn new(catalog: Arc<dyn TrackCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl AutofillStrategy for RandomAutofill {
    async fn choose_track_for_autofill(&self, _now: DateTime<Utc>) -> StoreResult<Option<TrackId>> {
        self.catalog.random_eligible_track().await
    }
}

/// Rotates through a curated playlist, one track per call.
pub struct FallbackPlaylistAutofill {
    catalog: Arc<dyn TrackCatalog>,
    playlist: PlaylistId,
    cursor: AtomicUsize,
}

impl FallbackPlaylistAutofill {
    pub fn new(catalog: Arc<dyn TrackCatalog>, playlist: PlaylistId) -> Self {
        Self {
            catalog,
            playlist,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AutofillStrategy for FallbackPlaylistAutofill {
    async fn choose_track_for_autofill(&self, _now: DateTime<Utc>) -> StoreResult<Option<TrackId>> {
        let Some(tracks) = self.catalog.playlist_tracks(self.playlist).await? else {
            debug!("Fallback {} does not exist.", self.playlist);
            return Ok(None);
        };
        if tracks.is_empty() {
            return Ok(None);
        }
        let start = self.cursor.load(Ordering::Relaxed) % tracks.len();
        for step in 0..tracks.len() {
            let index = (start + step) % tracks.len();
            let track = tracks[index];
            if matches!(self.catalog.duration_secs(track).await?, Some(secs) if secs > 0) {
                self.cursor.store(index + 1, Ordering::Relaxed);
                return Ok(Some(track));
            }
            debug!("Skipping {} in fallback {}: not schedulable.", track, self.playlist);
        }
        Ok(None)
    }
}

/// Builds the strategy selected by `policy`, or `None` when autofill is off.
pub fn strategy_for(
    policy: &AutofillPolicy,
    catalog: Arc<dyn TrackCatalog>,
) -> Option<Arc<dyn AutofillStrategy>> {
    match policy {
        AutofillPolicy::Disabled => None,
        AutofillPolicy::Random => Some(Arc::new(RandomAutofill::new(catalog))),
        AutofillPolicy::Playlist(playlist) => {
            Some(Arc::new(FallbackPlaylistAutofill::new(catalog, *playlist)))
        }
    }
}
