//! Defines all public event types produced by the station.
//!
//! Timeline operations describe what they changed with a [`ScheduleChange`];
//! the station turns those descriptors, together with now-playing transitions,
//! into [`StationEvent`]s for whatever sink delivers them.

use crate::common::{EntryId, PlaylistId, TrackId};
use crate::schedule::ScheduleEntry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// What a timeline operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Appended { entry: EntryId },
    PlaylistAppended { playlist: PlaylistId, entries: usize },
    SlotDeleted { slot: EntryId },
    TrackInserted { entry: EntryId },
    TrackChanged { slot: EntryId },
    DayReordered { date: NaiveDate },
}

/// A value describing a completed timeline mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleChange {
    pub kind: ChangeKind,
    /// Earliest instant whose airing may differ because of the change.
    pub effective_from: DateTime<Utc>,
}

impl ScheduleChange {
    /// Whether the change can alter what is airing at `now`.
    pub fn affects(&self, now: DateTime<Utc>) -> bool {
        self.effective_from <= now
    }
}

/// Notifications meant for listeners outside the station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationEvent {
    /// The airing track changed; `None` means nothing is on air.
    NowPlayingChanged { entry: Option<ScheduleEntry> },
    /// The timeline was edited from `effective_from` onward.
    ScheduleUpdated { effective_from: DateTime<Utc> },
}

/// Events related to the lifecycle of the station itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the station's tasks are running.
    StationStarted { timestamp: DateTime<Utc> },
    /// Fired once when the station is about to stop.
    StationShutdown,
    /// Fired when autofill extended an empty timeline.
    Autofilled { entry: EntryId, track: TrackId },
}
