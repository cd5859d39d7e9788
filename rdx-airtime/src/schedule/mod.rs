//! The schedule timeline: entries, their storage, the track catalog and the
//! engine that keeps the timeline gapless.

pub mod catalog;
pub mod engine;
mod rebuild;
pub mod store;

use crate::common::{EntryId, PlaylistId, TrackId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

/// One slot in the timeline: a track bound to a fixed `[start, end)` interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub id: EntryId,
    pub track_id: TrackId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The playlist this entry was generated from, if any.
    pub playlist_id: Option<PlaylistId>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    pub fn duration(&self) -> ChronoDuration {
        self.end_time - self.start_time
    }

    /// Whether `now` falls inside this entry's half-open interval.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// An entry as handed to the store for writing.
///
/// A draft without an id is inserted and receives a fresh [`EntryId`]; a draft
/// carrying an id replaces the stored entry with that id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub id: Option<EntryId>,
    pub track_id: TrackId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub playlist_id: Option<PlaylistId>,
    pub created_at: DateTime<Utc>,
}

impl EntryDraft {
    /// A fresh draft covering `[start_time, start_time + length)`.
    ///
    /// Returns `None` when the end falls outside the representable range.
    pub fn new(
        track_id: TrackId,
        start_time: DateTime<Utc>,
        length: ChronoDuration,
        playlist_id: Option<PlaylistId>,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        Some(Self {
            id: None,
            track_id,
            start_time,
            end_time: start_time.checked_add_signed(length)?,
            playlist_id,
            created_at,
        })
    }

    pub(crate) fn into_entry(self, id: EntryId) -> ScheduleEntry {
        ScheduleEntry {
            id,
            track_id: self.track_id,
            start_time: self.start_time,
            end_time: self.end_time,
            playlist_id: self.playlist_id,
            created_at: self.created_at,
        }
    }
}

impl From<ScheduleEntry> for EntryDraft {
    fn from(entry: ScheduleEntry) -> Self {
        Self {
            id: Some(entry.id),
            track_id: entry.track_id,
            start_time: entry.start_time,
            end_time: entry.end_time,
            playlist_id: entry.playlist_id,
            created_at: entry.created_at,
        }
    }
}
