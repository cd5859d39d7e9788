//! Destinations for [`StationEvent`]s.

use crate::events::StationEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Delivers station events to the outside world. Publishing is
/// fire-and-forget; delivery is the sink's business.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: StationEvent);
}

/// Fans events out to every subscribed receiver.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<StationEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, event: StationEvent) {
        // No subscribers is fine.
        self.sender.send(event).ok();
    }
}

/// Writes events to the log and nowhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, event: StationEvent) {
        match event {
            StationEvent::NowPlayingChanged { entry: Some(entry) } => info!(
                "[NOW PLAYING] {} in slot {} until {}",
                entry.track_id, entry.id, entry.end_time
            ),
            StationEvent::NowPlayingChanged { entry: None } => info!("[NOW PLAYING] silence"),
            StationEvent::ScheduleUpdated { effective_from } => {
                info!("[SCHEDULE] updated from {}", effective_from)
            }
        }
    }
}

/// Publishes every event to each inner sink in turn.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn publish(&self, event: StationEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn fanout_reaches_every_subscriber() {
        let broadcast = Arc::new(BroadcastSink::new(4));
        let mut rx = broadcast.subscribe();
        let sink = FanoutSink::new().with(Arc::new(LogSink)).with(broadcast.clone());
        let effective_from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        sink.publish(StationEvent::ScheduleUpdated { effective_from });
        assert_eq!(rx.recv().await.unwrap(), StationEvent::ScheduleUpdated { effective_from });
    }
}
