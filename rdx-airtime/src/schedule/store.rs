//! Persistence seam for schedule entries.
//!
//! The engine only talks to a [`TimelineStore`]. [`MemoryStore`] is the
//! in-process implementation used by the daemon, the shell and the tests.

use super::{EntryDraft, ScheduleEntry};
use crate::common::EntryId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotmap::SlotMap;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("entry {0} does not exist in the store")]
    MissingEntry(EntryId),

    #[error("entry interval {start} .. {end} is empty or inverted")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A batch of changes applied by [`TimelineStore::commit`] as one unit.
#[derive(Debug, Clone, Default)]
pub struct TimelineWrite {
    pub deletes: Vec<EntryId>,
    pub upserts: Vec<EntryDraft>,
}

#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<ScheduleEntry>>;

    /// Entries whose `start_time` lies in `[start, end)`, ordered by start.
    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleEntry>>;

    /// The entry whose interval contains `now`.
    async fn find_current(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>>;

    /// The earliest entry starting after `now`.
    async fn find_next(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>>;

    /// The latest entry that finished at or before `now`.
    async fn find_previous(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>>;

    /// The entry with the latest `end_time` across the whole timeline.
    async fn find_last(&self) -> StoreResult<Option<ScheduleEntry>>;

    /// Persists a single draft, inserting or replacing as its id dictates.
    async fn insert(&self, draft: EntryDraft) -> StoreResult<ScheduleEntry>;

    /// Applies every delete and upsert in `write`, or none of them.
    ///
    /// Returns the persisted upserts in the order they were given.
    async fn commit(&self, write: TimelineWrite) -> StoreResult<Vec<ScheduleEntry>>;

    async fn save_all(&self, drafts: Vec<EntryDraft>) -> StoreResult<Vec<ScheduleEntry>> {
        self.commit(TimelineWrite {
            deletes: Vec::new(),
            upserts: drafts,
        })
        .await
    }

    async fn delete(&self, id: EntryId) -> StoreResult<()> {
        self.commit(TimelineWrite {
            deletes: vec![id],
            upserts: Vec::new(),
        })
        .await
        .map(|_| ())
    }
}

/// A [`TimelineStore`] that keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<SlotMap<EntryId, ScheduleEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry ordered by start time.
    pub async fn snapshot(&self) -> Vec<ScheduleEntry> {
        let entries = self.entries.read().await;
        sorted(entries.values().cloned())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn sorted(entries: impl Iterator<Item = ScheduleEntry>) -> Vec<ScheduleEntry> {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by_key(|entry| (entry.start_time, entry.id));
    entries
}

fn check_interval(draft: &EntryDraft) -> StoreResult<()> {
    if draft.start_time < draft.end_time {
        Ok(())
    } else {
        Err(StoreError::InvalidInterval {
            start: draft.start_time,
            end: draft.end_time,
        })
    }
}

fn write_draft(entries: &mut SlotMap<EntryId, ScheduleEntry>, draft: EntryDraft) -> ScheduleEntry {
    match draft.id {
        Some(id) => {
            let entry = draft.into_entry(id);
            if let Some(slot) = entries.get_mut(id) {
                *slot = entry.clone();
            }
            entry
        }
        None => {
            let id = entries.insert_with_key(|key| draft.into_entry(key));
            entries[id].clone()
        }
    }
}

#[async_trait]
impl TimelineStore for MemoryStore {
    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<ScheduleEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(sorted(
            entries
                .values()
                .filter(|entry| start <= entry.start_time && entry.start_time < end)
                .cloned(),
        ))
    }

    async fn find_current(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        let entries = self.entries.read().await;
        // With a healthy timeline at most one entry matches; prefer the most
        // recently started one otherwise.
        Ok(entries
            .values()
            .filter(|entry| entry.is_live_at(now))
            .max_by_key(|entry| (entry.start_time, entry.id))
            .cloned())
    }

    async fn find_next(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.start_time > now)
            .min_by_key(|entry| (entry.start_time, entry.id))
            .cloned())
    }

    async fn find_previous(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.end_time <= now)
            .max_by_key(|entry| (entry.end_time, entry.id))
            .cloned())
    }

    async fn find_last(&self) -> StoreResult<Option<ScheduleEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .max_by_key(|entry| (entry.end_time, entry.id))
            .cloned())
    }

    async fn insert(&self, draft: EntryDraft) -> StoreResult<ScheduleEntry> {
        check_interval(&draft)?;
        let mut entries = self.entries.write().await;
        if let Some(id) = draft.id {
            if !entries.contains_key(id) {
                return Err(StoreError::MissingEntry(id));
            }
        }
        Ok(write_draft(&mut entries, draft))
    }

    async fn commit(&self, write: TimelineWrite) -> StoreResult<Vec<ScheduleEntry>> {
        let mut entries = self.entries.write().await;

        // Validate the whole batch before touching anything.
        let deleted: HashSet<EntryId> = write.deletes.iter().copied().collect();
        for id in &write.deletes {
            if !entries.contains_key(*id) {
                return Err(StoreError::MissingEntry(*id));
            }
        }
        for draft in &write.upserts {
            check_interval(draft)?;
            if let Some(id) = draft.id {
                if !entries.contains_key(id) || deleted.contains(&id) {
                    return Err(StoreError::MissingEntry(id));
                }
            }
        }

        for id in write.deletes {
            entries.remove(id);
        }
        Ok(write
            .upserts
            .into_iter()
            .map(|draft| write_draft(&mut entries, draft))
            .collect())
    }
}
