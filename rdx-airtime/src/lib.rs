//! # Airtime
//!
//! A gapless radio timeline with a live now-playing clock.
//!
//! Airtime keeps a timeline of non-overlapping slots, each bound to one
//! track, and knows at every instant what is on air. Edits to the timeline
//! (appending, inserting, deleting, reordering) never leave a gap or an
//! overlap behind, and listeners hear about each real track transition
//! exactly once.
//!
//! ## Core Concepts
//!
//! - **TimelineEngine**: Owns the timeline invariants. Every edit rebuilds the
//!   affected run of slots so that each one starts where the previous ends,
//!   and reports what it changed as a `ScheduleChange` value.
//! - **Day Window**: Day-scoped edits work on the slots that start between two
//!   local midnights in the station timezone.
//! - **Now-Playing Clock**: A single task that owns the belief about what is
//!   on air. It is driven by a periodic tick and by schedule changes that take
//!   effect immediately, and emits `StationEvent::NowPlayingChanged` only when
//!   the airing track actually changes.
//! - **Autofill**: When nothing is airing and nothing is next, a pluggable
//!   strategy picks a track to keep the station from going silent.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use airtime::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a default configuration and seed a catalog.
//!     let config = AirtimeConfig::default();
//!     let catalog = MemoryCatalog::with_contents(
//!         [TrackInfo { id: TrackId(1), title: "Intro".into(), duration_secs: 120 }],
//!         [],
//!     );
//!
//!     // 2. Create the station over an in-memory store.
//!     let station = AirtimeStation::new(
//!         config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(catalog),
//!         Arc::new(SystemWallClock),
//!     );
//!
//!     // 3. Subscribe to station events before starting.
//!     let mut events = station.subscribe_station_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Received Station Event: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Schedule something.
//!     station.append_track(TrackId(1)).await?;
//!
//!     // 5. Run the station. It will shut down on Ctrl+C.
//!     station.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const STATION_ENGINE_NAME: &str = "Airtime";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod schedule;
pub mod time;

/// A prelude module for easy importing of the most common Airtime types.
pub mod prelude {
    pub use crate::common::{EntryId, PlaylistId, TrackId};
    pub use crate::components::autofill::{
        AutofillStrategy, FallbackPlaylistAutofill, RandomAutofill,
    };
    pub use crate::components::sink::{BroadcastSink, LogSink, NotificationSink};
    pub use crate::config::{AirtimeConfig, AutofillPolicy};
    pub use crate::engine::AirtimeStation;
    pub use crate::error::{ErrorKind, ScheduleError, ScheduleResult};
    pub use crate::events::{ChangeKind, ScheduleChange, StationEvent, SystemEvent};
    pub use crate::schedule::catalog::{MemoryCatalog, PlaylistInfo, TrackCatalog, TrackInfo};
    pub use crate::schedule::engine::TimelineEngine;
    pub use crate::schedule::store::{MemoryStore, TimelineStore};
    pub use crate::schedule::ScheduleEntry;
    pub use crate::time::{DayWindow, ManualClock, SystemWallClock, WallClock};
}
