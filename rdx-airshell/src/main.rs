use airtime::prelude::*;
use airtime::{STATION_ENGINE_NAME, VERSION as LIB_VERSION};
use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-------------------------------------------------------------".dimmed());
    println!("{}", version_string);
    println!("{}", "-------------------------------------------------------------".dimmed());
}

/// A few tracks so an unconfigured shell has something to play.
fn demo_catalog() -> MemoryCatalog {
    MemoryCatalog::with_contents(
        [
            TrackInfo { id: TrackId(1), title: "Station ID".into(), duration_secs: 15 },
            TrackInfo { id: TrackId(2), title: "Morning Theme".into(), duration_secs: 180 },
            TrackInfo { id: TrackId(3), title: "Long Drive".into(), duration_secs: 240 },
            TrackInfo { id: TrackId(4), title: "Night Walk".into(), duration_secs: 200 },
        ],
        [PlaylistInfo {
            id: PlaylistId(1),
            name: "Demo rotation".into(),
            tracks: vec![TrackId(2), TrackId(1), TrackId(3), TrackId(4)],
        }],
    )
}

/// Prints station events while the shared flag is set.
fn spawn_event_listener(station: &AirtimeStation, is_watching: Arc<AtomicBool>) {
    let mut station_rx = station.subscribe_station_events();
    let timezone = station.config().station.timezone;
    tokio::spawn(async move {
        while let Ok(event) = station_rx.recv().await {
            if !is_watching.load(Ordering::Relaxed) {
                continue;
            }
            match event {
                StationEvent::NowPlayingChanged { entry: Some(entry) } => {
                    println!("\n<-- [NOW PLAYING] {}", describe(&entry, timezone));
                }
                StationEvent::NowPlayingChanged { entry: None } => {
                    println!("\n<-- [NOW PLAYING] silence");
                }
                StationEvent::ScheduleUpdated { effective_from } => {
                    println!(
                        "\n<-- [SCHEDULE] updated from {}",
                        effective_from.with_timezone(&timezone).format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
    });
}

fn describe(entry: &ScheduleEntry, timezone: Tz) -> String {
    let playlist = entry
        .playlist_id
        .map(|playlist| format!(" from {}", playlist))
        .unwrap_or_default();
    format!(
        "slot {:>12}  {} - {}  {}{}",
        entry.id.to_string(),
        entry.start_time.with_timezone(&timezone).format("%H:%M:%S"),
        entry.end_time.with_timezone(&timezone).format("%H:%M:%S"),
        entry.track_id,
        playlist
    )
}

fn parse_date(arg: Option<&&str>, station: &AirtimeStation) -> Result<NaiveDate> {
    match arg {
        None | Some(&"today") => Ok(station.timeline().today()),
        Some(text) => text
            .parse::<NaiveDate>()
            .map_err(|_| anyhow!("'{}' is not a date (use YYYY-MM-DD or 'today').", text)),
    }
}

fn parse_number(arg: Option<&&str>, what: &str) -> Result<u64> {
    let text = arg.ok_or_else(|| anyhow!("Missing {}.", what))?;
    text.parse::<u64>()
        .map_err(|_| anyhow!("'{}' is not a valid {}.", text, what))
}

/// The slot after the one on air, by the station's own clock.
async fn next_slot(station: &AirtimeStation) -> Result<Option<ScheduleEntry>> {
    let timeline = station.timeline();
    Ok(timeline.next(timeline.now()).await?)
}

fn print_help() {
    println!("Available commands:");
    println!("  now                        - Shows what is on air.");
    println!("  next                       - Shows the next scheduled slot.");
    println!("  day [DATE]                 - Lists the slots of a day (default: today).");
    println!("  tracks                     - Lists the catalog.");
    println!("  append <TRACK>             - Appends a track to the end of the timeline.");
    println!("  playlist <ID>              - Appends a whole playlist.");
    println!("  insert <DATE> <TRACK> <P>  - Inserts a track into a day at position P.");
    println!("  delete <SLOT>              - Deletes a slot and closes the gap.");
    println!("  swap <SLOT> <TRACK>        - Changes the track of a slot.");
    println!("  reorder <DATE> <SLOT>...   - Moves the given slots to the front of the day.");
    println!("  watch on|off               - Starts or stops printing station events.");
    println!("  exit                       - Quits the shell.");
}

/// Runs one shell command. Returns `false` when the shell should exit.
async fn execute(
    args: &[&str],
    station: &AirtimeStation,
    catalog: &MemoryCatalog,
    is_watching: &AtomicBool,
) -> Result<bool> {
    let timezone = station.config().station.timezone;
    let Some(command) = args.first() else {
        return Ok(true);
    };
    match *command {
        "now" => match station.now_playing().await {
            Some(entry) => println!("--> On air: {}", describe(&entry, timezone)),
            None => println!("--> Nothing on air."),
        },
        "next" => match next_slot(station).await? {
            Some(entry) => println!("--> Next: {}", describe(&entry, timezone)),
            None => println!("--> Nothing scheduled next."),
        },
        "day" => {
            let date = parse_date(args.get(1), station)?;
            let entries = station.timeline().day(date).await?;
            println!("Slots on {} ({}):", date, entries.len());
            for entry in &entries {
                println!("  {}", describe(entry, timezone));
            }
        }
        "tracks" => {
            for track in catalog.tracks().await {
                println!(
                    "  {:<12} {:>5}s  {}",
                    track.id.to_string(),
                    track.duration_secs,
                    track.title
                );
            }
            for playlist in catalog.playlists().await {
                println!(
                    "  {:<12} {:>3} tracks  {}",
                    playlist.id.to_string(),
                    playlist.tracks.len(),
                    playlist.name
                );
            }
        }
        "append" => {
            let track = TrackId(parse_number(args.get(1), "track id")?);
            let entry = station.append_track(track).await?;
            println!("--> Appended {}", describe(&entry, timezone));
        }
        "playlist" => {
            let playlist = PlaylistId(parse_number(args.get(1), "playlist id")?);
            let entries = station.append_playlist(playlist).await?;
            println!("--> Appended {} slot(s) from {}.", entries.len(), playlist);
        }
        "insert" => {
            let date = parse_date(args.get(1), station)?;
            let track = TrackId(parse_number(args.get(2), "track id")?);
            let position = parse_number(args.get(3), "position")? as usize;
            let entry = station.insert_track(date, track, position).await?;
            println!("--> Inserted {}", describe(&entry, timezone));
        }
        "delete" => {
            let slot = EntryId::from_raw(parse_number(args.get(1), "slot id")?);
            station.delete_slot(slot).await?;
            println!("--> Slot {} deleted.", slot);
        }
        "swap" => {
            let slot = EntryId::from_raw(parse_number(args.get(1), "slot id")?);
            let track = TrackId(parse_number(args.get(2), "track id")?);
            let entry = station.change_track(slot, track).await?;
            println!("--> Now {}", describe(&entry, timezone));
        }
        "reorder" => {
            let date = parse_date(args.get(1), station)?;
            let ordered = args[2.min(args.len())..]
                .iter()
                .map(|arg| parse_number(Some(arg), "slot id").map(EntryId::from_raw))
                .collect::<Result<Vec<_>>>()?;
            let entries = station.reorder_day(date, &ordered).await?;
            println!("--> Reordered {} slot(s).", entries.len());
        }
        "watch" => match args.get(1) {
            Some(&"on") => {
                is_watching.store(true, Ordering::Relaxed);
                println!("--> Watching station events.");
            }
            Some(&"off") => {
                is_watching.store(false, Ordering::Relaxed);
                println!("--> Stopped watching station events.");
            }
            _ => bail!("Usage: watch on|off"),
        },
        "help" => print_help(),
        "exit" => return Ok(false),
        other => bail!("Unknown command: '{}'. Type 'help'.", other),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| "airtime.toml".to_string());
    let config = AirtimeConfig::load(&path)?;
    let catalog = if config.catalog.tracks.is_empty() {
        Arc::new(demo_catalog())
    } else {
        Arc::new(MemoryCatalog::with_contents(
            config.catalog.tracks.clone(),
            config.catalog.playlists.clone(),
        ))
    };

    let station = AirtimeStation::new(
        config,
        Arc::new(MemoryStore::new()),
        catalog.clone(),
        Arc::new(SystemWallClock),
    );
    let is_watching = Arc::new(AtomicBool::new(true));
    spawn_event_listener(&station, is_watching.clone());

    info!("Starting {} in the background...", STATION_ENGINE_NAME.cyan());
    let runtime = station.start()?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter));

    println!(
        "{} is on air. Type 'help' for commands or 'exit' to quit.",
        STATION_ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                match execute(&args, &station, &catalog, &is_watching).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
            Err(_) => {
                println!("Exiting airshell...");
                break;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn station_at(now: chrono::DateTime<Utc>) -> (AirtimeStation, Arc<MemoryCatalog>) {
        let mut config = AirtimeConfig::default();
        config.autofill.policy = AutofillPolicy::Disabled;
        let catalog = Arc::new(demo_catalog());
        let station = AirtimeStation::new(
            config,
            Arc::new(MemoryStore::new()),
            catalog.clone(),
            Arc::new(ManualClock::new(now)),
        );
        (station, catalog)
    }

    #[tokio::test]
    async fn next_follows_the_station_clock() {
        let (station, _) = station_at(Utc.with_ymd_and_hms(2021, 4, 1, 6, 0, 0).unwrap());
        station.append_track(TrackId(1)).await.unwrap();
        let following = station.append_track(TrackId(2)).await.unwrap();
        assert_eq!(next_slot(&station).await.unwrap(), Some(following));
    }

    async fn run(
        line: &str,
        station: &AirtimeStation,
        catalog: &MemoryCatalog,
        watching: &AtomicBool,
    ) -> Result<bool> {
        let args = line.split_whitespace().collect::<Vec<_>>();
        execute(&args, station, catalog, watching).await
    }

    #[tokio::test]
    async fn commands_edit_the_timeline() {
        let (station, catalog) = station_at(Utc.with_ymd_and_hms(2021, 4, 1, 6, 0, 0).unwrap());
        let watching = AtomicBool::new(false);

        assert!(run("playlist 1", &station, &catalog, &watching).await.unwrap());
        let today = station.timeline().today();
        assert_eq!(station.timeline().day(today).await.unwrap().len(), 4);
        assert!(run("append 99", &station, &catalog, &watching).await.is_err());
        assert!(run("insert today nope 0", &station, &catalog, &watching).await.is_err());
        assert!(run("watch on", &station, &catalog, &watching).await.unwrap());
        assert!(watching.load(Ordering::Relaxed));
        assert!(!run("exit", &station, &catalog, &watching).await.unwrap());
    }
}
