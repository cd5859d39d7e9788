use airtime::prelude::*;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration. A missing file means defaults.
    let path = std::env::args().nth(1).unwrap_or_else(|| "airtime.toml".to_string());
    let config = AirtimeConfig::load(&path)?;
    info!(
        "Loaded {} track(s) and {} playlist(s) from {}.",
        config.catalog.tracks.len(),
        config.catalog.playlists.len(),
        path
    );

    // 3. Build the station over an in-memory timeline.
    let catalog = MemoryCatalog::with_contents(
        config.catalog.tracks.clone(),
        config.catalog.playlists.clone(),
    );
    let station = AirtimeStation::with_sink(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(catalog),
        Arc::new(SystemWallClock),
        Some(Arc::new(LogSink)),
    );

    // 4. Log system events as they happen.
    spawn_event_listeners(&station);

    // 5. Run the station until Ctrl+C.
    station.run().await?;

    Ok(())
}

/// Spawns a task that reports the station's lifecycle events.
fn spawn_event_listeners(station: &AirtimeStation) {
    let mut system_rx = station.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });
}
