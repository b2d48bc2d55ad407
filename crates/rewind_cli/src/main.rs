//! Rewind CLI
//!
//! Plays recorded telemetry sessions back in real time (or scaled time) and
//! prints every delivered batch as JSON lines on stdout. Logs go to stderr.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::RewindConfig;
use rewind_replay::{
    Event, EventMapper, HistoryEventStream, HistoryFeeder, JsonLinesReader, ObserverError,
    Replayer,
};

/// Longest the feed loop sleeps without a delivered batch
const FEED_INTERVAL: Duration = Duration::from_millis(20);

/// Wakes the feed loop as soon as a batch goes out, so the player is topped
/// up before it drains.
#[derive(Default)]
struct FeedSignal {
    delivered: Mutex<bool>,
    wake: Condvar,
}

impl FeedSignal {
    fn notify(&self) {
        *self.delivered.lock() = true;
        self.wake.notify_one();
    }

    /// Wait for a delivery, at most `timeout`. Returns whether one happened.
    fn wait(&self, timeout: Duration) -> bool {
        let mut delivered = self.delivered.lock();
        if !*delivered {
            self.wake.wait_for(&mut delivered, timeout);
        }
        std::mem::replace(&mut *delivered, false)
    }
}

#[derive(Parser)]
#[command(name = "rewind")]
#[command(author, version, about = "Rewind - replay recorded telemetry sessions")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a recording, printing delivered events as JSON lines
    Play {
        /// Recording file (JSON lines)
        file: PathBuf,

        /// Playback rate, overrides the config file
        #[arg(short, long)]
        speed: Option<f64>,

        /// Skip this many seconds from the start of the recording
        #[arg(long, value_name = "SECS")]
        seek: Option<f64>,

        /// Config file (defaults to ./rewind.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit the first location update immediately, before playback
        #[arg(long)]
        first_location: bool,
    },

    /// Summarize a recording without playing it
    Info {
        /// Recording file (JSON lines)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Play {
            file,
            speed,
            seek,
            config,
            first_location,
        } => cmd_play(&file, speed, seek, config.as_deref(), first_location),
        Commands::Info { file } => cmd_info(&file),
    }
}

fn cmd_play(
    file: &Path,
    speed: Option<f64>,
    seek: Option<f64>,
    config_path: Option<&Path>,
    first_location: bool,
) -> Result<()> {
    let mut config = RewindConfig::load(config_path)?;
    if let Some(speed) = speed {
        config.playback.speed = speed;
    }

    let reader = JsonLinesReader::open(file)
        .with_context(|| format!("Failed to open recording {}", file.display()))?;

    let mut mapper = EventMapper::standard();
    for kind in &config.history.disabled_kinds {
        mapper.disable_kind(kind.as_str());
    }

    let mut feeder = HistoryFeeder::new(HistoryEventStream::new(reader), mapper)
        .with_chunk_size(config.history.chunk_size)
        .with_low_water(config.history.low_water);

    let player = Replayer::<Event>::new(config.replay_config())
        .context("Invalid playback configuration")?;
    player.register_observer(Arc::new(print_batch));

    let signal = Arc::new(FeedSignal::default());
    let feed_signal = signal.clone();
    player.register_observer(Arc::new(move |_: &[Event]| -> Result<(), ObserverError> {
        feed_signal.notify();
        Ok(())
    }));

    if let Some(offset) = seek {
        let skipped = feeder
            .skip_to_offset(offset)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        info!("Skipped {} events ({}s)", skipped, offset);
    }

    feeder
        .fill(&player)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if first_location && !player.play_first_location() {
        warn!("No location update in the first chunk of the recording");
    }

    info!(
        "Playing {} at {}x",
        file.display(),
        player.playback_speed()
    );
    let started = Instant::now();
    player.play()?;

    loop {
        feeder
            .fill(&player)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        if feeder.is_exhausted() && player.pending_len() == 0 {
            break;
        }
        signal.wait(FEED_INTERVAL);
    }
    player.finish();

    info!(
        "Played {} events in {:.2}s ({} records dropped)",
        feeder.pushed(),
        started.elapsed().as_secs_f64(),
        feeder.dropped()
    );

    Ok(())
}

fn print_batch(events: &[Event]) -> Result<(), ObserverError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in events {
        serde_json::to_writer(&mut out, event).map_err(|e| ObserverError::new(e.to_string()))?;
        writeln!(out).map_err(|e| ObserverError::new(e.to_string()))?;
    }
    out.flush().map_err(|e| ObserverError::new(e.to_string()))
}

/// Aggregate view of a recording
#[derive(Debug, Default)]
struct Summary {
    records: usize,
    kinds: BTreeMap<String, usize>,
    first: Option<f64>,
    last: Option<f64>,
}

impl Summary {
    fn duration_seconds(&self) -> f64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

fn summarize(stream: impl Iterator<Item = rewind_replay::Result<rewind_replay::RawRecord>>) -> Result<Summary> {
    let mut summary = Summary::default();
    for record in stream {
        let record = record?;
        summary.records += 1;
        *summary.kinds.entry(record.kind).or_default() += 1;
        summary.first = Some(summary.first.map_or(record.event_time, |t| t.min(record.event_time)));
        summary.last = Some(summary.last.map_or(record.event_time, |t| t.max(record.event_time)));
    }
    Ok(summary)
}

fn cmd_info(file: &Path) -> Result<()> {
    let reader = JsonLinesReader::open(file)
        .with_context(|| format!("Failed to open recording {}", file.display()))?;
    let summary = summarize(HistoryEventStream::new(reader))
        .with_context(|| format!("Failed to read {}", file.display()))?;

    println!("Recording: {}", file.display());
    println!("Records:   {}", summary.records);
    println!("Duration:  {:.3}s", summary.duration_seconds());
    for (kind, count) in &summary.kinds {
        println!("  {kind:<20} {count}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    #[test]
    fn test_summary_counts_kinds_and_span() {
        let text = "{\"kind\":\"getStatus\",\"event_time\":3}\n\n{\"kind\":\"updateLocation\",\"event_time\":1,\"lat\":1,\"lon\":2}\n{\"kind\":\"getStatus\",\"event_time\":7.5}\n";
        let stream = HistoryEventStream::new(JsonLinesReader::new(Cursor::new(text)));

        let summary = summarize(stream).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.kinds.get("getStatus"), Some(&2));
        assert_eq!(summary.duration_seconds(), 6.5);
    }

    #[test]
    fn test_summary_reports_bad_line() {
        let text = "{\"kind\":\"getStatus\",\"event_time\":3}\nnot json\n";
        let stream = HistoryEventStream::new(JsonLinesReader::new(Cursor::new(text)));
        assert!(summarize(stream).is_err());
    }

    #[test]
    fn test_feed_signal_wakes_on_delivery() {
        let signal = Arc::new(FeedSignal::default());
        let notifier = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify();
        });

        let started = Instant::now();
        assert!(signal.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();

        // Consumed: the next wait times out
        assert!(!signal.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_cli_parses_play_flags() {
        let cli = Cli::try_parse_from(["rewind", "play", "trip.jsonl", "--speed", "4", "--seek", "30"]).unwrap();
        match cli.command {
            Commands::Play { speed, seek, first_location, .. } => {
                assert_eq!(speed, Some(4.0));
                assert_eq!(seek, Some(30.0));
                assert!(!first_location);
            }
            Commands::Info { .. } => panic!("expected play"),
        }
    }
}
