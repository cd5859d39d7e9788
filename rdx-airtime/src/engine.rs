//! The station that orchestrates the timeline, the clock and autofill.

use crate::common::{EntryId, PlaylistId, TrackId};
use crate::components::autofill::{strategy_for, AutofillStrategy};
use crate::components::now_playing::{ClockHandle, NowPlayingClock};
use crate::components::sink::{BroadcastSink, FanoutSink, NotificationSink};
use crate::config::AirtimeConfig;
use crate::error::ScheduleResult;
use crate::events::{ScheduleChange, StationEvent, SystemEvent};
use crate::schedule::catalog::TrackCatalog;
use crate::schedule::engine::{ScheduleOutcome, TimelineEngine};
use crate::schedule::store::TimelineStore;
use crate::schedule::ScheduleEntry;
use crate::time::{SystemClock, TickEvent, WallClock};
use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// The main Airtime station.
///
/// This struct is the central point of control. It owns the timeline engine,
/// forwards every change descriptor to the now-playing clock and the
/// notification sink, and drives the tick loop. The station is designed to be
/// cloned and shared across tasks, providing a handle to the running
/// instance.
#[derive(Clone)]
pub struct AirtimeStation {
    config: Arc<AirtimeConfig>,
    timeline: Arc<TimelineEngine>,
    wall_clock: Arc<dyn WallClock>,
    autofill: Option<Arc<dyn AutofillStrategy>>,

    // --- Event plumbing ---
    station_events: Arc<BroadcastSink>,
    sink: Arc<dyn NotificationSink>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    system_event_sender: broadcast::Sender<SystemEvent>,

    // --- The now-playing clock, parked until spawned ---
    clock: ClockHandle,
    pending_clock: Arc<Mutex<Option<NowPlayingClock>>>,
}

/// Background tasks of a started station.
pub struct StationRuntime {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl StationRuntime {
    /// Stops the ticker and the dispatcher and waits for them.
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        for task in self.tasks {
            task.await.ok();
        }
    }
}

// Core implementation block for internal logic.
impl AirtimeStation {
    /// Creates a new station over the given store and catalog.
    ///
    /// The autofill strategy is chosen by `config.autofill.policy`.
    pub fn new(
        config: AirtimeConfig,
        store: Arc<dyn TimelineStore>,
        catalog: Arc<dyn TrackCatalog>,
        wall_clock: Arc<dyn WallClock>,
    ) -> Self {
        Self::with_sink(config, store, catalog, wall_clock, None)
    }

    /// Like [`AirtimeStation::new`], with an extra sink that receives every
    /// station event alongside the broadcast subscribers.
    pub fn with_sink(
        config: AirtimeConfig,
        store: Arc<dyn TimelineStore>,
        catalog: Arc<dyn TrackCatalog>,
        wall_clock: Arc<dyn WallClock>,
        extra_sink: Option<Arc<dyn NotificationSink>>,
    ) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let (tick_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(64);
        let station_events = Arc::new(BroadcastSink::new(CHANNEL_CAPACITY));
        let sink: Arc<dyn NotificationSink> = match extra_sink {
            Some(extra) => Arc::new(FanoutSink::new().with(station_events.clone()).with(extra)),
            None => station_events.clone(),
        };

        let timeline = Arc::new(TimelineEngine::new(
            store,
            catalog.clone(),
            wall_clock.clone(),
            config.station.timezone,
        ));
        let autofill = strategy_for(&config.autofill.policy, catalog);
        let (clock, handle) =
            NowPlayingClock::new(timeline.clone(), wall_clock.clone(), sink.clone());

        Self {
            config: Arc::new(config),
            timeline,
            wall_clock,
            autofill,
            station_events,
            sink,
            tick_sender,
            system_event_sender,
            clock: handle,
            pending_clock: Arc::new(Mutex::new(Some(clock))),
        }
    }

    /// Replaces the autofill strategy chosen from configuration.
    pub fn set_autofill(&mut self, strategy: Option<Arc<dyn AutofillStrategy>>) {
        self.autofill = strategy;
    }

    /// Spawns the now-playing clock task. Only the first call spawns; later
    /// calls fail.
    pub fn spawn_clock(&self) -> anyhow::Result<JoinHandle<()>> {
        let clock = self
            .pending_clock
            .lock()
            .map_err(|_| anyhow!("now-playing clock slot is poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("now-playing clock is already running"))?;
        Ok(clock.spawn())
    }

    /// Starts the clock, the ticker and the dispatcher.
    pub fn start(&self) -> anyhow::Result<StationRuntime> {
        info!("{} starting up...", self.config.station.name);
        self.spawn_clock()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        let ticker = SystemClock::new(
            self.config.clock.tick_interval(),
            self.wall_clock.clone(),
            self.tick_sender.clone(),
        );
        let ticker_task = tokio::spawn(ticker.run(shutdown_tx.subscribe()));

        let dispatcher = self.clone();
        let dispatcher_task = tokio::spawn(dispatcher.dispatcher_loop(shutdown_tx.subscribe()));

        info!(
            "{} on air in {} with a {:?} tick.",
            self.config.station.name,
            self.config.station.timezone,
            self.config.clock.tick_interval()
        );
        Ok(StationRuntime {
            shutdown_tx,
            tasks: vec![ticker_task, dispatcher_task],
        })
    }

    /// Runs the station until a shutdown signal is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        let runtime = self.start()?;
        info!("Press Ctrl+C to shut down.");
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received. Stopping the station...");
        runtime.shutdown().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.system_event_sender.send(SystemEvent::StationShutdown).ok();
        info!("{} has shut down.", self.config.station.name);
        Ok(())
    }

    #[doc(hidden)]
    async fn dispatcher_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick_rx = self.tick_sender.subscribe();
        self.system_event_sender
            .send(SystemEvent::StationStarted {
                timestamp: self.wall_clock.now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                received = tick_rx.recv() => match received {
                    Ok(tick) => {
                        trace!("Tick #{} received.", tick.tick_count);
                        self.process_tick(tick.timestamp).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dispatcher fell behind and skipped {} tick(s).", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    /// Everything that happens on one tick: autofill if the timeline is dry,
    /// then a now-playing recalculation.
    pub async fn process_tick(&self, now: DateTime<Utc>) {
        if let Err(e) = self.autofill_if_idle(now).await {
            error!("Autofill failed: {}", e);
        }
        self.clock.tick(now);
    }

    /// Appends an autofill track when nothing is airing and nothing is
    /// scheduled next. Returns the new entry, if one was added.
    pub async fn autofill_if_idle(
        &self,
        now: DateTime<Utc>,
    ) -> ScheduleResult<Option<ScheduleEntry>> {
        let Some(strategy) = &self.autofill else {
            return Ok(None);
        };
        if self.timeline.current(now).await?.is_some() || self.timeline.next(now).await?.is_some() {
            return Ok(None);
        }
        let Some(track) = strategy.choose_track_for_autofill(now).await? else {
            debug!("Autofill found nothing to schedule.");
            return Ok(None);
        };
        let entry = self.dispatch(self.timeline.append_to_tail(track).await?);
        info!("Autofilled {} as slot {}.", track, entry.id);
        self.system_event_sender
            .send(SystemEvent::Autofilled {
                entry: entry.id,
                track,
            })
            .ok();
        Ok(Some(entry))
    }

    fn clock_spawned(&self) -> bool {
        self.pending_clock
            .lock()
            .map(|pending| pending.is_none())
            .unwrap_or(false)
    }

    /// Hands a change descriptor to the sink and the clock, and unwraps the
    /// operation's output.
    fn dispatch<T>(&self, outcome: ScheduleOutcome<T>) -> T {
        let ScheduleOutcome { output, change } = outcome;
        self.announce(change);
        output
    }

    fn announce(&self, change: ScheduleChange) {
        debug!("Schedule change {:?}", change.kind);
        self.sink.publish(StationEvent::ScheduleUpdated {
            effective_from: change.effective_from,
        });
        self.clock.schedule_changed(change);
    }
}

// Public API implementation block.
impl AirtimeStation {
    pub async fn append_track(&self, track: TrackId) -> ScheduleResult<ScheduleEntry> {
        Ok(self.dispatch(self.timeline.append_to_tail(track).await?))
    }

    pub async fn append_playlist(
        &self,
        playlist: PlaylistId,
    ) -> ScheduleResult<Vec<ScheduleEntry>> {
        Ok(self.dispatch(self.timeline.append_playlist_to_tail(playlist).await?))
    }

    pub async fn delete_slot(&self, slot: EntryId) -> ScheduleResult<()> {
        Ok(self.dispatch(self.timeline.delete_slot_and_rebuild_day(slot).await?))
    }

    pub async fn insert_track(
        &self,
        date: NaiveDate,
        track: TrackId,
        position: usize,
    ) -> ScheduleResult<ScheduleEntry> {
        Ok(self.dispatch(self.timeline.insert_track_into_day(date, track, position).await?))
    }

    pub async fn change_track(
        &self,
        slot: EntryId,
        track: TrackId,
    ) -> ScheduleResult<ScheduleEntry> {
        Ok(self.dispatch(self.timeline.change_track_in_slot(slot, track).await?))
    }

    pub async fn reorder_day(
        &self,
        date: NaiveDate,
        ordered_ids: &[EntryId],
    ) -> ScheduleResult<Vec<ScheduleEntry>> {
        Ok(self.dispatch(self.timeline.reorder_day(date, ordered_ids).await?))
    }

    /// What the now-playing clock believes is on air.
    ///
    /// `None` until the clock has been spawned by [`AirtimeStation::start`]
    /// or [`AirtimeStation::spawn_clock`].
    pub async fn now_playing(&self) -> Option<ScheduleEntry> {
        if !self.clock_spawned() {
            return None;
        }
        self.clock.now_playing().await
    }

    /// Read access to the timeline for queries.
    pub fn timeline(&self) -> &TimelineEngine {
        &self.timeline
    }

    pub fn config(&self) -> &AirtimeConfig {
        &self.config
    }

    /// Subscribes to now-playing and schedule notifications.
    pub fn subscribe_station_events(&self) -> broadcast::Receiver<StationEvent> {
        self.station_events.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the raw tick stream.
    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutofillPolicy;
    use crate::schedule::catalog::{MemoryCatalog, TrackInfo};
    use crate::schedule::store::MemoryStore;
    use crate::time::ManualClock;
    use chrono::TimeZone;

    fn station(policy: AutofillPolicy) -> AirtimeStation {
        let mut config = AirtimeConfig::default();
        config.autofill.policy = policy;
        let catalog = MemoryCatalog::with_contents(
            [TrackInfo { id: TrackId(1), title: "A".into(), duration_secs: 60 }],
            [],
        );
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        AirtimeStation::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(catalog),
            Arc::new(ManualClock::new(now)),
        )
    }

    #[tokio::test]
    async fn dispatcher_keeps_going_after_falling_behind() {
        let station = station(AutofillPolicy::Random);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dispatcher = tokio::spawn(station.clone().dispatcher_loop(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // More ticks than the channel holds, sent before the dispatcher runs.
        let now = station.timeline().now();
        for tick_count in 1..=300 {
            let tick = TickEvent { tick_count, timestamp: now };
            station.tick_sender.send(Arc::new(tick)).unwrap();
        }

        let mut tail = None;
        for _ in 0..200 {
            tail = station.timeline().tail_end().await.unwrap();
            if tail.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(tail, Some(now + chrono::Duration::seconds(60)));

        shutdown_tx.send(()).unwrap();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn now_playing_is_empty_until_the_clock_runs() {
        let station = station(AutofillPolicy::Disabled);
        let entry = station.append_track(TrackId(1)).await.unwrap();

        let before = tokio::time::timeout(Duration::from_secs(1), station.now_playing()).await;
        assert_eq!(before.unwrap(), None);

        station.spawn_clock().unwrap();
        assert_eq!(station.now_playing().await, Some(entry));
    }
}
