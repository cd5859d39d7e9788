//! Defines all configuration structures for the station.
//!
//! These structs are designed to be deserialized from a TOML file with the
//! `config` crate, with `AIRTIME__SECTION__KEY` environment variables layered
//! on top. Every field has a default, so an absent file yields a working
//! station on UTC with one-second ticks and random autofill.

use crate::common::PlaylistId;
use crate::schedule::catalog::{PlaylistInfo, TrackInfo};
use anyhow::{bail, Context};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for an `AirtimeStation`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirtimeConfig {
    #[serde(default)]
    pub station: StationConfig,

    #[serde(default)]
    pub clock: ClockConfig,

    #[serde(default)]
    pub autofill: AutofillConfig,

    /// Tracks and playlists to seed an in-memory catalog with.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Human-readable station name, used in logs.
    #[serde(default = "default_station_name")]
    pub name: String,

    /// The timezone that defines day boundaries. Uses the string names from
    /// the IANA Time Zone Database (e.g., "America/New_York").
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

/// Pace of the now-playing clock.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutofillConfig {
    #[serde(default)]
    pub policy: AutofillPolicy,
}

/// What to schedule when nothing is current and nothing is next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutofillPolicy {
    /// Leave the timeline empty.
    Disabled,
    /// Any eligible track from the catalog.
    #[default]
    Random,
    /// Rotate through the given playlist.
    Playlist(PlaylistId),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub tracks: Vec<TrackInfo>,

    #[serde(default)]
    pub playlists: Vec<PlaylistInfo>,
}

impl AirtimeConfig {
    /// Loads the configuration from `path`, if it exists, then applies
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("AIRTIME")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.clock.tick_interval_ms == 0 {
            bail!("clock.tick_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

// --- Default value functions for serde ---

fn default_station_name() -> String {
    "airtime".to_string()
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: default_station_name(),
            timezone: default_timezone(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}
