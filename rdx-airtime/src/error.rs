//! Errors raised by timeline operations.

use crate::common::{EntryId, PlaylistId, TrackId};
use crate::schedule::store::StoreError;

/// Broad classes of [`ScheduleError`], for callers that map errors onto
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    ConflictingOperation,
    StoreFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("playlist not found: {0}")]
    PlaylistNotFound(PlaylistId),

    #[error("schedule slot not found: {0}")]
    SlotNotFound(EntryId),

    #[error("{track} cannot be scheduled with a duration of {duration_secs}s")]
    NonPositiveDuration { track: TrackId, duration_secs: i64 },

    #[error("{track} is too long to schedule ({duration_secs}s)")]
    DurationOutOfRange { track: TrackId, duration_secs: i64 },

    #[error("the timeline cannot extend past the end of representable time")]
    TimelineOverflow,

    #[error("{0} has no tracks to schedule")]
    EmptyPlaylist(PlaylistId),

    #[error("slot {0} is on air and cannot be deleted")]
    CurrentlyPlaying(EntryId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TrackNotFound(_) | Self::PlaylistNotFound(_) | Self::SlotNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::NonPositiveDuration { .. }
            | Self::DurationOutOfRange { .. }
            | Self::TimelineOverflow
            | Self::EmptyPlaylist(_) => ErrorKind::InvalidState,
            Self::CurrentlyPlaying(_) => ErrorKind::ConflictingOperation,
            Self::Store(_) => ErrorKind::StoreFailure,
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
