//! Contains common, primitive types shared across the timeline.
//!
//! This module defines the identifiers used for schedule entries, tracks and
//! playlists. Using distinct types keeps a track id from ever being passed
//! where a playlist id is expected.

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, KeyData};
use std::fmt;

new_key_type! {
    /// Uniquely identifies a schedule entry.
    ///
    /// The key is assigned by the timeline store when the entry is first
    /// persisted and never changes afterwards. Keys are not reused, so a stale
    /// id held by a caller cannot alias a newer entry.
    pub struct EntryId;
}

impl EntryId {
    /// Returns a stable numeric form of this id, suitable for display and
    /// for round-tripping through text interfaces such as the shell.
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuilds an id from the value produced by [`EntryId::to_raw`].
    pub fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// Identifies a track in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Identifies a playlist in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub u64);

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "playlist#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn entry_id_survives_raw_conversion() {
        let mut map: SlotMap<EntryId, ()> = SlotMap::with_key();
        let id = map.insert(());
        assert_eq!(EntryId::from_raw(id.to_raw()), id);
        assert_eq!(id.to_string(), id.to_raw().to_string());
    }
}
