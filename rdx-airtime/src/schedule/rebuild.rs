//! Resequencing of contiguous runs of entries.

use super::{EntryDraft, ScheduleEntry};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// An entry waiting to be laid out, together with the length it must occupy.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub draft: EntryDraft,
    pub length: ChronoDuration,
}

/// Lays `slots` end to end starting at `anchor` and returns the end of the
/// last one, or `None` if the run would end past the representable range.
pub(crate) fn lay_out(slots: &mut [Slot], anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut cursor = anchor;
    for slot in slots.iter_mut() {
        slot.draft.start_time = cursor;
        slot.draft.end_time = cursor.checked_add_signed(slot.length)?;
        cursor = slot.draft.end_time;
    }
    Some(cursor)
}

/// Shifts entries that would start before `cursor` forward, keeping their
/// lengths, until the first one that no longer overlaps.
///
/// `following` must be ordered by start time.
pub(crate) fn push_following(
    following: Vec<ScheduleEntry>,
    mut cursor: DateTime<Utc>,
) -> Option<Vec<EntryDraft>> {
    let mut shifted = Vec::new();
    for entry in following {
        if entry.start_time >= cursor {
            break;
        }
        let length = entry.duration();
        let mut draft = EntryDraft::from(entry);
        draft.start_time = cursor;
        draft.end_time = cursor.checked_add_signed(length)?;
        cursor = draft.end_time;
        shifted.push(draft);
    }
    Some(shifted)
}
