//! The schedule timeline engine.
//!
//! Every mutation runs under one write lock covering "read the affected run,
//! recompute it, commit it", and each commit is a single atomic
//! [`TimelineWrite`]. Readers never see a half-rebuilt day. Operations do not
//! publish anything themselves: they hand back a [`ScheduleOutcome`] whose
//! [`ScheduleChange`] the caller forwards to the clock and the sink.

use super::catalog::TrackCatalog;
use super::rebuild::{lay_out, push_following, Slot};
use super::store::{TimelineStore, TimelineWrite};
use super::{EntryDraft, ScheduleEntry};
use crate::common::{EntryId, PlaylistId, TrackId};
use crate::error::{ScheduleError, ScheduleResult};
use crate::events::{ChangeKind, ScheduleChange};
use crate::time::{DayWindow, WallClock};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The result of a mutation together with the change it made.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome<T> {
    pub output: T,
    pub change: ScheduleChange,
}

impl<T> ScheduleOutcome<T> {
    fn new(output: T, kind: ChangeKind, effective_from: DateTime<Utc>) -> Self {
        Self {
            output,
            change: ScheduleChange {
                kind,
                effective_from,
            },
        }
    }
}

pub struct TimelineEngine {
    store: Arc<dyn TimelineStore>,
    catalog: Arc<dyn TrackCatalog>,
    wall_clock: Arc<dyn WallClock>,
    timezone: Tz,
    write_lock: Mutex<()>,
}

// Internal helpers.
impl TimelineEngine {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        catalog: Arc<dyn TrackCatalog>,
        wall_clock: Arc<dyn WallClock>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            catalog,
            wall_clock,
            timezone,
            write_lock: Mutex::new(()),
        }
    }

    /// Length a newly scheduled track occupies.
    async fn track_length(&self, track: TrackId) -> ScheduleResult<ChronoDuration> {
        let duration_secs = self
            .catalog
            .duration_secs(track)
            .await?
            .ok_or(ScheduleError::TrackNotFound(track))?;
        if duration_secs <= 0 {
            return Err(ScheduleError::NonPositiveDuration {
                track,
                duration_secs,
            });
        }
        ChronoDuration::try_seconds(duration_secs).ok_or(ScheduleError::DurationOutOfRange {
            track,
            duration_secs,
        })
    }

    /// Length an already scheduled entry occupies when its run is rebuilt.
    ///
    /// Falls back to the stored length when the catalog can no longer vouch
    /// for the track, so one stale reference cannot block edits to the day.
    async fn rebuild_length(&self, entry: &ScheduleEntry) -> ScheduleResult<ChronoDuration> {
        match self.catalog.duration_secs(entry.track_id).await? {
            Some(duration_secs) if duration_secs > 0 => {
                if let Some(length) = ChronoDuration::try_seconds(duration_secs) {
                    return Ok(length);
                }
                warn!(
                    "{} reports an out-of-range {}s; slot {} keeps its stored length.",
                    entry.track_id, duration_secs, entry.id
                );
                Ok(entry.duration())
            }
            Some(duration_secs) => {
                warn!(
                    "{} now reports {}s; slot {} keeps its stored length.",
                    entry.track_id, duration_secs, entry.id
                );
                Ok(entry.duration())
            }
            None => {
                warn!(
                    "{} is missing from the catalog; slot {} keeps its stored length.",
                    entry.track_id, entry.id
                );
                Ok(entry.duration())
            }
        }
    }

    async fn plan(&self, entries: Vec<ScheduleEntry>) -> ScheduleResult<Vec<Slot>> {
        let mut slots = Vec::with_capacity(entries.len());
        for entry in entries {
            let length = self.rebuild_length(&entry).await?;
            slots.push(Slot {
                draft: entry.into(),
                length,
            });
        }
        Ok(slots)
    }

    /// Where new content starts when appended: the end of the timeline, or
    /// now if the timeline is empty or already over.
    async fn tail_start(&self, now: DateTime<Utc>) -> ScheduleResult<DateTime<Utc>> {
        Ok(match self.store.find_last().await? {
            Some(last) if last.end_time > now => last.end_time,
            _ => now,
        })
    }

    /// Anchor for a day that has no entries of its own: the day start, unless
    /// the previous day's last entry runs past midnight.
    async fn empty_day_anchor(&self, window: &DayWindow) -> ScheduleResult<DateTime<Utc>> {
        Ok(match self.store.find_current(window.start).await? {
            Some(spilling) if spilling.start_time < window.start => spilling.end_time,
            _ => window.start,
        })
    }

    /// Drafts for the entries after `window` that a rebuilt day ending at
    /// `day_end` would overlap.
    async fn spill_over(
        &self,
        window: &DayWindow,
        day_end: DateTime<Utc>,
    ) -> ScheduleResult<Vec<EntryDraft>> {
        if day_end <= window.end {
            return Ok(Vec::new());
        }
        let following = self
            .store
            .find_in_range(window.end, DateTime::<Utc>::MAX_UTC)
            .await?;
        let shifted =
            push_following(following, day_end).ok_or(ScheduleError::TimelineOverflow)?;
        if !shifted.is_empty() {
            info!(
                "Day {} now runs until {}; pushed {} following slot(s) forward.",
                window.date,
                day_end,
                shifted.len()
            );
        }
        Ok(shifted)
    }

    fn day_window(&self, date: NaiveDate) -> DayWindow {
        DayWindow::for_date(date, self.timezone)
    }
}

// Mutations.
impl TimelineEngine {
    /// Schedules `track_id` right after the last entry of the timeline.
    pub async fn append_to_tail(
        &self,
        track_id: TrackId,
    ) -> ScheduleResult<ScheduleOutcome<ScheduleEntry>> {
        let length = self.track_length(track_id).await?;
        let _guard = self.write_lock.lock().await;
        let now = self.wall_clock.now();
        let start = self.tail_start(now).await?;
        let entry = self
            .store
            .insert(
                EntryDraft::new(track_id, start, length, None, now)
                    .ok_or(ScheduleError::TimelineOverflow)?,
            )
            .await?;
        info!(
            "Appended {} as slot {} ({} .. {}).",
            track_id, entry.id, entry.start_time, entry.end_time
        );
        let effective_from = entry.start_time;
        let kind = ChangeKind::Appended { entry: entry.id };
        Ok(ScheduleOutcome::new(entry, kind, effective_from))
    }

    /// Schedules every member of a playlist, in order, after the last entry
    /// of the timeline. Nothing is written unless every member is schedulable.
    pub async fn append_playlist_to_tail(
        &self,
        playlist_id: PlaylistId,
    ) -> ScheduleResult<ScheduleOutcome<Vec<ScheduleEntry>>> {
        let members = self
            .catalog
            .playlist_tracks(playlist_id)
            .await?
            .ok_or(ScheduleError::PlaylistNotFound(playlist_id))?;
        if members.is_empty() {
            return Err(ScheduleError::EmptyPlaylist(playlist_id));
        }
        let mut lengths = Vec::with_capacity(members.len());
        for track in &members {
            lengths.push(self.track_length(*track).await?);
        }

        let _guard = self.write_lock.lock().await;
        let now = self.wall_clock.now();
        let mut cursor = self.tail_start(now).await?;
        let mut drafts = Vec::with_capacity(members.len());
        for (track, length) in members.iter().zip(lengths) {
            let draft = EntryDraft::new(*track, cursor, length, Some(playlist_id), now)
                .ok_or(ScheduleError::TimelineOverflow)?;
            cursor = draft.end_time;
            drafts.push(draft);
        }
        let entries = self.store.save_all(drafts).await?;

        let effective_from = entries.first().map_or(now, |entry| entry.start_time);
        info!(
            "Appended {} slot(s) from {} starting at {}.",
            entries.len(),
            playlist_id,
            effective_from
        );
        let kind = ChangeKind::PlaylistAppended {
            playlist: playlist_id,
            entries: entries.len(),
        };
        Ok(ScheduleOutcome::new(entries, kind, effective_from))
    }

    /// Removes a slot and closes the hole it leaves in its day.
    ///
    /// A slot that is on air right now cannot be deleted.
    pub async fn delete_slot_and_rebuild_day(
        &self,
        slot_id: EntryId,
    ) -> ScheduleResult<ScheduleOutcome<()>> {
        let _guard = self.write_lock.lock().await;
        let deleted = self
            .store
            .find_by_id(slot_id)
            .await?
            .ok_or(ScheduleError::SlotNotFound(slot_id))?;
        if deleted.is_live_at(self.wall_clock.now()) {
            return Err(ScheduleError::CurrentlyPlaying(slot_id));
        }

        let window = DayWindow::containing(deleted.start_time, self.timezone);
        let day = self.store.find_in_range(window.start, window.end).await?;
        let anchor = day.first().map_or(window.start, |first| first.start_time);
        let remaining: Vec<_> = day.into_iter().filter(|entry| entry.id != slot_id).collect();

        let mut slots = self.plan(remaining).await?;
        let day_end = lay_out(&mut slots, anchor).ok_or(ScheduleError::TimelineOverflow)?;
        let effective_from = slots
            .first()
            .map_or(deleted.start_time, |slot| slot.draft.start_time);
        let mut upserts: Vec<_> = slots.into_iter().map(|slot| slot.draft).collect();
        upserts.extend(self.spill_over(&window, day_end).await?);

        let rebuilt = upserts.len();
        self.store
            .commit(TimelineWrite {
                deletes: vec![slot_id],
                upserts,
            })
            .await?;
        info!(
            "Deleted slot {} ({}); rebuilt {} slot(s) of {}.",
            slot_id, deleted.track_id, rebuilt, window.date
        );
        Ok(ScheduleOutcome::new(
            (),
            ChangeKind::SlotDeleted { slot: slot_id },
            effective_from,
        ))
    }

    /// Splices `track_id` into `date` at `position` and resequences the
    /// whole day from its first start.
    ///
    /// `position` is clamped to the number of slots in the day.
    pub async fn insert_track_into_day(
        &self,
        date: NaiveDate,
        track_id: TrackId,
        position: usize,
    ) -> ScheduleResult<ScheduleOutcome<ScheduleEntry>> {
        let length = self.track_length(track_id).await?;
        let _guard = self.write_lock.lock().await;
        let now = self.wall_clock.now();
        let window = self.day_window(date);
        let day = self.store.find_in_range(window.start, window.end).await?;
        let anchor = match day.first() {
            Some(first) => first.start_time,
            None => self.empty_day_anchor(&window).await?,
        };

        let mut slots = self.plan(day).await?;
        let position = position.min(slots.len());
        let draft = EntryDraft::new(track_id, anchor, length, None, now)
            .ok_or(ScheduleError::TimelineOverflow)?;
        slots.insert(position, Slot { draft, length });
        let day_end = lay_out(&mut slots, anchor).ok_or(ScheduleError::TimelineOverflow)?;
        let mut upserts: Vec<_> = slots.into_iter().map(|slot| slot.draft).collect();
        upserts.extend(self.spill_over(&window, day_end).await?);

        let mut saved = self
            .store
            .commit(TimelineWrite {
                deletes: Vec::new(),
                upserts,
            })
            .await?;
        let inserted = saved.swap_remove(position);
        info!(
            "Inserted {} into {} at position {} as slot {}.",
            track_id, date, position, inserted.id
        );
        let kind = ChangeKind::TrackInserted { entry: inserted.id };
        Ok(ScheduleOutcome::new(inserted, kind, anchor))
    }

    /// Points an existing slot at another track and resequences the rest of
    /// its day from that slot on. Earlier slots are left alone.
    pub async fn change_track_in_slot(
        &self,
        slot_id: EntryId,
        track_id: TrackId,
    ) -> ScheduleResult<ScheduleOutcome<ScheduleEntry>> {
        let length = self.track_length(track_id).await?;
        let _guard = self.write_lock.lock().await;
        let changed = self
            .store
            .find_by_id(slot_id)
            .await?
            .ok_or(ScheduleError::SlotNotFound(slot_id))?;

        let window = DayWindow::containing(changed.start_time, self.timezone);
        let mut day = self.store.find_in_range(window.start, window.end).await?;
        let index = day
            .iter()
            .position(|entry| entry.id == slot_id)
            .ok_or(ScheduleError::SlotNotFound(slot_id))?;
        let rest = day.split_off(index + 1);

        let mut head = EntryDraft::from(changed.clone());
        head.track_id = track_id;
        let mut slots = vec![Slot {
            draft: head,
            length,
        }];
        slots.extend(self.plan(rest).await?);
        let day_end = lay_out(&mut slots, changed.start_time)
            .ok_or(ScheduleError::TimelineOverflow)?;
        let mut upserts: Vec<_> = slots.into_iter().map(|slot| slot.draft).collect();
        upserts.extend(self.spill_over(&window, day_end).await?);

        let mut saved = self
            .store
            .commit(TimelineWrite {
                deletes: Vec::new(),
                upserts,
            })
            .await?;
        let updated = saved.swap_remove(0);
        info!(
            "Slot {} now plays {} instead of {}.",
            slot_id, track_id, changed.track_id
        );
        Ok(ScheduleOutcome::new(
            updated,
            ChangeKind::TrackChanged { slot: slot_id },
            changed.start_time,
        ))
    }

    /// Reorders the slots of `date`.
    ///
    /// Slots named in `ordered_ids` come first in the given order; the rest
    /// follow in their previous relative order. Repeated ids count once. An
    /// id that is not part of the day rejects the whole operation.
    pub async fn reorder_day(
        &self,
        date: NaiveDate,
        ordered_ids: &[EntryId],
    ) -> ScheduleResult<ScheduleOutcome<Vec<ScheduleEntry>>> {
        let _guard = self.write_lock.lock().await;
        let window = self.day_window(date);
        let day = self.store.find_in_range(window.start, window.end).await?;
        let kind = ChangeKind::DayReordered { date };

        let known: HashSet<EntryId> = day.iter().map(|entry| entry.id).collect();
        if let Some(unknown) = ordered_ids.iter().find(|id| !known.contains(*id)) {
            return Err(ScheduleError::SlotNotFound(*unknown));
        }
        let Some(anchor) = day.first().map(|first| first.start_time) else {
            debug!("Nothing to reorder on {}.", date);
            return Ok(ScheduleOutcome::new(Vec::new(), kind, window.start));
        };

        let mut named = HashSet::with_capacity(ordered_ids.len());
        let mut reordered = Vec::with_capacity(day.len());
        for id in ordered_ids {
            if named.insert(*id) {
                if let Some(entry) = day.iter().find(|entry| entry.id == *id) {
                    reordered.push(entry.clone());
                }
            }
        }
        reordered.extend(day.into_iter().filter(|entry| !named.contains(&entry.id)));

        let mut slots = self.plan(reordered).await?;
        let day_length = slots.len();
        let day_end = lay_out(&mut slots, anchor).ok_or(ScheduleError::TimelineOverflow)?;
        let mut upserts: Vec<_> = slots.into_iter().map(|slot| slot.draft).collect();
        upserts.extend(self.spill_over(&window, day_end).await?);

        let mut saved = self
            .store
            .commit(TimelineWrite {
                deletes: Vec::new(),
                upserts,
            })
            .await?;
        saved.truncate(day_length);
        info!("Reordered {} slot(s) of {}.", day_length, date);
        Ok(ScheduleOutcome::new(saved, kind, anchor))
    }
}

// Read-only queries. These only take the store's read side.
impl TimelineEngine {
    pub async fn current(&self, now: DateTime<Utc>) -> ScheduleResult<Option<ScheduleEntry>> {
        Ok(self.store.find_current(now).await?)
    }

    pub async fn next(&self, now: DateTime<Utc>) -> ScheduleResult<Option<ScheduleEntry>> {
        Ok(self.store.find_next(now).await?)
    }

    pub async fn previous(&self, now: DateTime<Utc>) -> ScheduleResult<Option<ScheduleEntry>> {
        Ok(self.store.find_previous(now).await?)
    }

    pub async fn entry(&self, id: EntryId) -> ScheduleResult<Option<ScheduleEntry>> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// Slots of one station-local day, ordered by start.
    pub async fn day(&self, date: NaiveDate) -> ScheduleResult<Vec<ScheduleEntry>> {
        let window = self.day_window(date);
        Ok(self.store.find_in_range(window.start, window.end).await?)
    }

    /// Slots starting in `[start, end)`, ordered by start.
    pub async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ScheduleResult<Vec<ScheduleEntry>> {
        Ok(self.store.find_in_range(start, end).await?)
    }

    /// End of the last scheduled slot, if any.
    pub async fn tail_end(&self) -> ScheduleResult<Option<DateTime<Utc>>> {
        Ok(self.store.find_last().await?.map(|last| last.end_time))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Today's date in the station timezone.
    pub fn today(&self) -> NaiveDate {
        self.wall_clock.now().with_timezone(&self.timezone).date_naive()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.wall_clock.now()
    }
}
