//! The now-playing clock.
//!
//! [`NowPlayingTracker`] holds the belief about what is on air and decides
//! when that belief changes. [`NowPlayingClock`] is the single task that owns
//! a tracker; ticks and schedule-change triggers reach it through a
//! [`ClockHandle`], so recalculations never interleave and each transition is
//! announced at most once.

use crate::components::sink::NotificationSink;
use crate::error::ScheduleResult;
use crate::events::{ScheduleChange, StationEvent};
use crate::schedule::engine::TimelineEngine;
use crate::schedule::ScheduleEntry;
use crate::time::WallClock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Tracks the entry believed to be on air.
#[derive(Debug, Default)]
pub struct NowPlayingTracker {
    cached: Option<ScheduleEntry>,
}

impl NowPlayingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<&ScheduleEntry> {
        self.cached.as_ref()
    }

    /// Periodic recalculation.
    ///
    /// While the cached entry has not finished nothing is looked up.
    /// Returns the event to publish, if the airing track changed.
    pub async fn recalc(
        &mut self,
        now: DateTime<Utc>,
        timeline: &TimelineEngine,
    ) -> ScheduleResult<Option<StationEvent>> {
        if let Some(cached) = &self.cached {
            if now < cached.end_time {
                trace!("Slot {} still airing until {}.", cached.id, cached.end_time);
                return Ok(None);
            }
        }
        self.refresh(now, timeline).await
    }

    /// Recalculation that always consults the timeline, used after an edit
    /// may have changed the airing slot under the cache.
    pub async fn refresh(
        &mut self,
        now: DateTime<Utc>,
        timeline: &TimelineEngine,
    ) -> ScheduleResult<Option<StationEvent>> {
        let current = timeline.current(now).await?;
        Ok(self.observe(current))
    }

    /// Compares the freshly looked-up entry with the cached one.
    ///
    /// The same track under a new entry id is not a transition: the cache
    /// follows the new entry silently so listeners do not restart audio.
    fn observe(&mut self, current: Option<ScheduleEntry>) -> Option<StationEvent> {
        let unchanged = match (self.cached.as_ref(), current.as_ref()) {
            (None, None) => true,
            (Some(old), Some(new)) if old.track_id == new.track_id => {
                if old.id != new.id {
                    debug!(
                        "{} moved from slot {} to slot {}; no transition.",
                        new.track_id, old.id, new.id
                    );
                }
                true
            }
            _ => false,
        };
        if unchanged {
            self.cached = current;
            return None;
        }
        self.cached = current.clone();
        Some(StationEvent::NowPlayingChanged { entry: current })
    }
}

#[derive(Debug)]
enum ClockCommand {
    Tick(DateTime<Utc>),
    ScheduleChanged(ScheduleChange),
    Snapshot(oneshot::Sender<Option<ScheduleEntry>>),
}

/// Cheap, cloneable access to a running [`NowPlayingClock`].
#[derive(Debug, Clone)]
pub struct ClockHandle {
    sender: mpsc::UnboundedSender<ClockCommand>,
}

impl ClockHandle {
    /// Asks the clock to recalculate for the tick taken at `now`.
    pub fn tick(&self, now: DateTime<Utc>) {
        self.send(ClockCommand::Tick(now));
    }

    /// Informs the clock that the timeline changed.
    pub fn schedule_changed(&self, change: ScheduleChange) {
        self.send(ClockCommand::ScheduleChanged(change));
    }

    /// The entry the clock currently believes is on air.
    ///
    /// Every command sent before this call has been handled once it returns.
    /// Before [`NowPlayingClock::spawn`] the request waits in the queue.
    pub async fn now_playing(&self) -> Option<ScheduleEntry> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ClockCommand::Snapshot(reply_tx));
        reply_rx.await.ok().flatten()
    }

    fn send(&self, command: ClockCommand) {
        if self.sender.send(command).is_err() {
            debug!("Now-playing clock is gone; command dropped.");
        }
    }
}

/// The task that owns the now-playing state.
pub struct NowPlayingClock {
    tracker: NowPlayingTracker,
    timeline: Arc<TimelineEngine>,
    wall_clock: Arc<dyn WallClock>,
    sink: Arc<dyn NotificationSink>,
    receiver: mpsc::UnboundedReceiver<ClockCommand>,
}

impl NowPlayingClock {
    /// Creates the clock and the handle that drives it. The clock does
    /// nothing until [`NowPlayingClock::spawn`] is called; commands sent in
    /// the meantime are queued.
    pub fn new(
        timeline: Arc<TimelineEngine>,
        wall_clock: Arc<dyn WallClock>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, ClockHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let clock = Self {
            tracker: NowPlayingTracker::new(),
            timeline,
            wall_clock,
            sink,
            receiver,
        };
        (clock, ClockHandle { sender })
    }

    /// Runs the clock on its own task until every handle is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Now-playing clock started.");
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        info!("Now-playing clock stopped.");
    }

    async fn handle(&mut self, command: ClockCommand) {
        let result = match command {
            ClockCommand::Tick(now) => self.tracker.recalc(now, &self.timeline).await,
            ClockCommand::ScheduleChanged(change) => {
                let now = self.wall_clock.now();
                if !change.affects(now) {
                    trace!(
                        "Change effective from {} does not touch the air yet.",
                        change.effective_from
                    );
                    return;
                }
                debug!(
                    "Change effective from {} hits the air; recalculating.",
                    change.effective_from
                );
                self.tracker.refresh(now, &self.timeline).await
            }
            ClockCommand::Snapshot(reply) => {
                reply.send(self.tracker.cached().cloned()).ok();
                return;
            }
        };
        match result {
            Ok(Some(event)) => {
                if let StationEvent::NowPlayingChanged { entry } = &event {
                    match entry {
                        Some(entry) => info!("Now playing {} (slot {}).", entry.track_id, entry.id),
                        None => info!("Nothing on air."),
                    }
                }
                self.sink.publish(event);
            }
            Ok(None) => {}
            // The next tick retries.
            Err(e) => error!("Now-playing recalculation failed: {}", e),
        }
    }
}
