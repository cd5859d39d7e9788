//! Sources of time for the station.
//!
//! Everything that needs "now" asks a [`WallClock`] instead of calling
//! `Utc::now()` directly, so simulations and tests can drive the timeline with
//! a [`ManualClock`]. The [`SystemClock`] is the periodic ticker that paces the
//! now-playing clock, and [`DayWindow`] maps calendar dates in the station
//! timezone onto UTC instants.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Anything that can tell the current instant.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = instant;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single beat of the [`SystemClock`].
#[derive(Debug, Clone)]
pub struct TickEvent {
    /// Number of ticks emitted since the clock started, starting at 1.
    pub tick_count: u64,
    /// Wall-clock instant at which the tick was taken.
    pub timestamp: DateTime<Utc>,
}

/// A fixed-interval ticker that runs as its own task.
pub struct SystemClock {
    interval: Duration,
    wall_clock: Arc<dyn WallClock>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

impl SystemClock {
    pub fn new(
        interval: Duration,
        wall_clock: Arc<dyn WallClock>,
        tick_sender: broadcast::Sender<Arc<TickEvent>>,
    ) -> Self {
        Self {
            interval,
            wall_clock,
            tick_sender,
        }
    }

    /// Ticks until a shutdown signal arrives.
    ///
    /// Missed ticks are skipped rather than burst, so a stalled runtime does
    /// not replay a backlog of stale instants.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick_count = 0u64;
        debug!("SystemClock started with a {:?} interval.", self.interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    tick_count += 1;
                    let tick = TickEvent { tick_count, timestamp: self.wall_clock.now() };
                    trace!("Tick #{} at {}", tick.tick_count, tick.timestamp);
                    self.tick_sender.send(Arc::new(tick)).ok();
                }
            }
        }
        debug!("SystemClock stopped after {} ticks.", tick_count);
    }
}

/// The half-open UTC interval covered by one calendar day in the station
/// timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate, timezone: Tz) -> Self {
        let start = local_midnight(date, timezone);
        let end = match date.succ_opt() {
            Some(next) => local_midnight(next, timezone),
            None => DateTime::<Utc>::MAX_UTC,
        };
        Self { date, start, end }
    }

    /// The window of the station-local day that `instant` falls on.
    pub fn containing(instant: DateTime<Utc>, timezone: Tz) -> Self {
        Self::for_date(instant.with_timezone(&timezone).date_naive(), timezone)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// First instant of `date` in `timezone`.
///
/// An ambiguous midnight resolves to its earlier instant. When midnight falls
/// into a DST gap the first valid quarter hour after it is used.
fn local_midnight(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    if let Some(start) = timezone.from_local_datetime(&midnight).earliest() {
        return start.with_timezone(&Utc);
    }
    (1..=96)
        .find_map(|quarter| {
            timezone
                .from_local_datetime(&(midnight + ChronoDuration::minutes(15 * quarter)))
                .earliest()
        })
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_day_window_spans_twenty_four_hours() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let window = DayWindow::for_date(date, Tz::UTC);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn day_window_follows_station_timezone() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let window = DayWindow::for_date(date, chrono_tz::Europe::Paris);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 1, 14, 23, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap());
    }

    #[test]
    fn dst_day_is_shorter() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap();
        let window = DayWindow::for_date(date, chrono_tz::Europe::Paris);
        assert_eq!(window.end - window.start, ChronoDuration::hours(23));
    }

    #[test]
    fn midnight_inside_dst_gap_moves_forward() {
        // Santiago springs forward at local midnight.
        let date = NaiveDate::from_ymd_opt(2026, 9, 6).unwrap();
        let window = DayWindow::for_date(date, chrono_tz::America::Santiago);
        let local = window.start.with_timezone(&chrono_tz::America::Santiago);
        assert_eq!(local.date_naive(), date);
        assert_eq!(local.time(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn containing_uses_local_date() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 15, 23, 30, 0).unwrap();
        let window = DayWindow::containing(instant, chrono_tz::Europe::Paris);
        assert_eq!(window.date, NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
        assert!(window.contains(instant));
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(ChronoDuration::seconds(90));
        assert_eq!(clock.now(), start + ChronoDuration::seconds(90));
    }
}
