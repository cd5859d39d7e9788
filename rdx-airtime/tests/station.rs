use airtime::prelude::*;
use airtime::schedule::store::{StoreError, StoreResult, TimelineWrite};
use airtime::schedule::EntryDraft;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const A: TrackId = TrackId(1);
const B: TrackId = TrackId(2);
const C: TrackId = TrackId(3);
const FIVE: TrackId = TrackId(5);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn secs(n: i64) -> ChronoDuration {
    ChronoDuration::seconds(n)
}

fn catalog() -> MemoryCatalog {
    MemoryCatalog::with_contents(
        [
            TrackInfo { id: A, title: "A".into(), duration_secs: 60 },
            TrackInfo { id: B, title: "B".into(), duration_secs: 60 },
            TrackInfo { id: C, title: "C".into(), duration_secs: 30 },
            TrackInfo { id: FIVE, title: "five".into(), duration_secs: 120 },
        ],
        [PlaylistInfo { id: PlaylistId(1), name: "abc".into(), tracks: vec![A, B, C] }],
    )
}

/// A store whose commits can be made to fail on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    failing_reads: AtomicBool,
}

#[async_trait]
impl TimelineStore for FlakyStore {
    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<ScheduleEntry>> {
        self.inner.find_by_id(id).await
    }

    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        self.inner.find_in_range(start, end).await
    }

    async fn find_current(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read timed out".into()));
        }
        self.inner.find_current(now).await
    }

    async fn find_next(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        self.inner.find_next(now).await
    }

    async fn find_previous(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduleEntry>> {
        self.inner.find_previous(now).await
    }

    async fn find_last(&self) -> StoreResult<Option<ScheduleEntry>> {
        self.inner.find_last().await
    }

    async fn insert(&self, draft: EntryDraft) -> StoreResult<ScheduleEntry> {
        self.inner.insert(draft).await
    }

    async fn commit(&self, write: TimelineWrite) -> StoreResult<Vec<ScheduleEntry>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk on fire".into()));
        }
        self.inner.commit(write).await
    }
}

struct Harness {
    station: AirtimeStation,
    store: Arc<FlakyStore>,
    clock: ManualClock,
    events: broadcast::Receiver<StationEvent>,
}

fn harness(policy: AutofillPolicy) -> Harness {
    let mut config = AirtimeConfig::default();
    config.autofill.policy = policy;
    let store = Arc::new(FlakyStore::default());
    let clock = ManualClock::new(t0());
    let station = AirtimeStation::new(
        config,
        store.clone(),
        Arc::new(catalog()),
        Arc::new(clock.clone()),
    );
    let events = station.subscribe_station_events();
    station.spawn_clock().unwrap();
    Harness { station, store, clock, events }
}

fn drain(events: &mut broadcast::Receiver<StationEvent>) -> Vec<StationEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn transitions(events: &[StationEvent]) -> Vec<Option<TrackId>> {
    events
        .iter()
        .filter_map(|event| match event {
            StationEvent::NowPlayingChanged { entry } => {
                Some(entry.as_ref().map(|entry| entry.track_id))
            }
            StationEvent::ScheduleUpdated { .. } => None,
        })
        .collect()
}

fn now_playing_events(events: &mut broadcast::Receiver<StationEvent>) -> Vec<Option<TrackId>> {
    transitions(&drain(events))
}

fn assert_gapless(entries: &[ScheduleEntry]) {
    for pair in entries.windows(2) {
        assert_eq!(pair[0].end_time, pair[1].start_time, "gap or overlap in {entries:?}");
    }
}

async fn tick(h: &Harness, at: DateTime<Utc>) {
    h.clock.set(at);
    h.station.process_tick(at).await;
    // Round-trips through the clock, so the tick has been handled.
    h.station.now_playing().await;
}

#[tokio::test]
async fn append_on_empty_timeline() {
    let h = harness(AutofillPolicy::Disabled);
    let entry = h.station.append_track(FIVE).await.unwrap();
    assert_eq!(entry.start_time, t0());
    assert_eq!(entry.end_time, t0() + secs(120));

    let timeline = h.station.timeline();
    assert_eq!(timeline.current(t0() + secs(10)).await.unwrap(), Some(entry));
    assert_eq!(timeline.current(t0() + secs(130)).await.unwrap(), None);
}

#[tokio::test]
async fn append_reaches_the_air_without_waiting_for_a_tick() {
    let mut h = harness(AutofillPolicy::Disabled);
    h.station.append_track(A).await.unwrap();
    assert_eq!(h.station.now_playing().await.map(|entry| entry.track_id), Some(A));

    let events = drain(&mut h.events);
    assert!(matches!(
        events[0],
        StationEvent::ScheduleUpdated { effective_from } if effective_from == t0()
    ));
    assert!(matches!(
        &events[1],
        StationEvent::NowPlayingChanged { entry: Some(entry) } if entry.track_id == A
    ));
}

#[tokio::test]
async fn playlist_plays_through_with_one_event_per_transition() {
    let mut h = harness(AutofillPolicy::Disabled);
    h.station.append_playlist(PlaylistId(1)).await.unwrap();
    for offset in (0..=160).step_by(5) {
        tick(&h, t0() + secs(offset)).await;
    }
    let events = drain(&mut h.events);
    let updates = events
        .iter()
        .filter(|event| matches!(event, StationEvent::ScheduleUpdated { .. }))
        .count();
    assert_eq!(updates, 1);
    assert_eq!(transitions(&events), vec![Some(A), Some(B), Some(C), None]);
}

#[tokio::test]
async fn clock_recovers_from_a_failed_read() {
    let mut h = harness(AutofillPolicy::Disabled);
    h.store.failing_reads.store(true, Ordering::SeqCst);
    h.station.append_track(A).await.unwrap();
    tick(&h, t0() + secs(5)).await;
    assert_eq!(now_playing_events(&mut h.events), Vec::<Option<TrackId>>::new());
    assert_eq!(h.station.now_playing().await, None);

    h.store.failing_reads.store(false, Ordering::SeqCst);
    tick(&h, t0() + secs(10)).await;
    assert_eq!(now_playing_events(&mut h.events), vec![Some(A)]);
}

#[tokio::test]
async fn deleting_the_live_slot_is_refused() {
    let h = harness(AutofillPolicy::Disabled);
    let live = h.station.append_track(A).await.unwrap();
    h.station.append_track(B).await.unwrap();
    let before = h.store.inner.snapshot().await;

    h.clock.set(t0() + secs(30));
    let err = h.station.delete_slot(live.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingOperation);
    assert!(matches!(err, ScheduleError::CurrentlyPlaying(id) if id == live.id));
    assert_eq!(h.store.inner.snapshot().await, before);
}

#[tokio::test]
async fn deleting_the_next_slot_keeps_the_day_gapless() {
    let h = harness(AutofillPolicy::Disabled);
    h.station.append_track(A).await.unwrap();
    let next = h.station.append_track(B).await.unwrap();
    h.station.append_track(C).await.unwrap();

    h.station.delete_slot(next.id).await.unwrap();
    let day = h.station.timeline().day(today()).await.unwrap();
    let tracks: Vec<_> = day.iter().map(|entry| entry.track_id).collect();
    assert_eq!(tracks, vec![A, C]);
    assert_gapless(&day);
}

#[tokio::test]
async fn reorder_of_airing_track_does_not_restart_it() {
    let mut h = harness(AutofillPolicy::Disabled);
    let a = h.station.append_track(A).await.unwrap();
    let b = h.station.append_track(B).await.unwrap();
    tick(&h, t0() + secs(10)).await;
    drain(&mut h.events);

    // Replace the airing slot with a fresh one for the same track, then
    // reorder so it still covers now.
    h.store.inner.delete(a.id).await.unwrap();
    let draft = EntryDraft::new(A, t0(), secs(60), None, t0()).unwrap();
    let again = h.store.inner.insert(draft).await.unwrap();
    h.station.reorder_day(today(), &[again.id, b.id]).await.unwrap();
    tick(&h, t0() + secs(20)).await;

    assert_eq!(now_playing_events(&mut h.events), Vec::<Option<TrackId>>::new());
    assert_eq!(h.station.now_playing().await.map(|entry| entry.id), Some(again.id));
}

#[tokio::test]
async fn swapping_the_live_track_is_announced_immediately() {
    let mut h = harness(AutofillPolicy::Disabled);
    let live = h.station.append_track(A).await.unwrap();
    tick(&h, t0() + secs(5)).await;
    drain(&mut h.events);

    h.clock.set(t0() + secs(6));
    h.station.change_track(live.id, B).await.unwrap();
    h.station.now_playing().await;
    assert_eq!(now_playing_events(&mut h.events), vec![Some(B)]);
}

#[tokio::test]
async fn autofill_keeps_the_station_on_air() {
    let mut h = harness(AutofillPolicy::Playlist(PlaylistId(1)));
    tick(&h, t0()).await;
    assert_eq!(h.station.now_playing().await.map(|entry| entry.track_id), Some(A));

    // Something is current, so the next tick adds nothing.
    tick(&h, t0() + secs(30)).await;
    assert_eq!(h.station.timeline().day(today()).await.unwrap().len(), 1);

    tick(&h, t0() + secs(60)).await;
    let day = h.station.timeline().day(today()).await.unwrap();
    assert_eq!(day.len(), 2);
    assert_eq!(day[1].track_id, B);
    assert_eq!(day[1].playlist_id, None);
    assert_gapless(&day);
    assert_eq!(now_playing_events(&mut h.events), vec![Some(A), Some(B)]);
}

#[tokio::test]
async fn autofill_with_nothing_eligible_stays_silent() {
    let mut config = AirtimeConfig::default();
    config.autofill.policy = AutofillPolicy::Random;
    let clock = ManualClock::new(t0());
    let station = AirtimeStation::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCatalog::new()),
        Arc::new(clock),
    );
    assert_eq!(station.autofill_if_idle(t0()).await.unwrap(), None);
}

/// Always proposes the same track.
struct Jingle(TrackId);

#[async_trait]
impl AutofillStrategy for Jingle {
    async fn choose_track_for_autofill(&self, _now: DateTime<Utc>) -> StoreResult<Option<TrackId>> {
        Ok(Some(self.0))
    }
}

#[tokio::test]
async fn custom_autofill_airs_tracks_added_at_runtime() {
    let jingle = TrackId(42);
    let catalog = Arc::new(MemoryCatalog::new());
    let mut station = AirtimeStation::new(
        AirtimeConfig::default(),
        Arc::new(MemoryStore::new()),
        catalog.clone(),
        Arc::new(ManualClock::new(t0())),
    );
    station.set_autofill(Some(Arc::new(Jingle(jingle))));

    let err = station.autofill_if_idle(t0()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    catalog
        .add_track(TrackInfo { id: jingle, title: "jingle".into(), duration_secs: 15 })
        .await;
    let entry = station.autofill_if_idle(t0()).await.unwrap().unwrap();
    assert_eq!(entry.track_id, jingle);
    assert_eq!(entry.end_time, t0() + secs(15));

    station.set_autofill(None);
    let later = t0() + secs(20);
    assert_eq!(station.autofill_if_idle(later).await.unwrap(), None);
}

#[tokio::test]
async fn failed_rebuild_writes_nothing() {
    let h = harness(AutofillPolicy::Disabled);
    h.station.append_track(A).await.unwrap();
    let doomed = h.station.append_track(B).await.unwrap();
    h.station.append_track(C).await.unwrap();
    let before = h.store.inner.snapshot().await;

    h.store.failing.store(true, Ordering::SeqCst);
    let err = h.station.delete_slot(doomed.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    let err = h.station.insert_track(today(), C, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(h.store.inner.snapshot().await, before);
}

#[tokio::test]
async fn mixed_edits_never_break_the_day() {
    let h = harness(AutofillPolicy::Disabled);
    h.clock.set(Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap());
    let date = today();

    let first = h.station.insert_track(date, A, 0).await.unwrap();
    let second = h.station.insert_track(date, B, 5).await.unwrap();
    let third = h.station.insert_track(date, C, 1).await.unwrap();
    h.station.insert_track(date, FIVE, 0).await.unwrap();
    h.station.change_track(second.id, FIVE).await.unwrap();
    h.station.reorder_day(date, &[second.id, first.id]).await.unwrap();
    h.station.delete_slot(third.id).await.unwrap();

    let day = h.station.timeline().day(date).await.unwrap();
    assert_eq!(day.len(), 3);
    assert_eq!(day[0].start_time, Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap());
    assert_eq!(day[0].id, second.id);
    assert_eq!(day[1].id, first.id);
    assert_gapless(&day);
}

#[tokio::test]
async fn started_station_ticks_on_its_own() {
    let mut config = AirtimeConfig::default();
    config.autofill.policy = AutofillPolicy::Random;
    config.clock.tick_interval_ms = 10;
    let station = AirtimeStation::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(catalog()),
        Arc::new(SystemWallClock),
    );
    let mut events = station.subscribe_station_events();
    let runtime = station.start().unwrap();

    let announced = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let event = events.recv().await;
            if let Ok(StationEvent::NowPlayingChanged { entry: Some(entry) }) = event {
                return entry;
            }
        }
    })
    .await
    .unwrap();
    runtime.shutdown().await;
    assert!(station.start().is_err());
    assert_eq!(station.now_playing().await.map(|entry| entry.id), Some(announced.id));
}
