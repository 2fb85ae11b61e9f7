use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;

use step_tracker_rs::{GeoFix, MotionSample, Session, StepTracker, TrackerConfig};

/// Replay a recorded sensor log through the step pipeline and print a
/// deterministic summary. Useful for regression-checking detector changes
/// against golden walks.
#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded log (JSON: { samples: [...], fixes: [...] })
    #[arg(long)]
    log: PathBuf,

    /// Step detection sensitivity (1-5)
    #[arg(long, default_value = "3")]
    sensitivity: u8,

    /// Body weight in kilograms
    #[arg(long, default_value = "70.0")]
    weight_kg: f64,

    /// Replay inside a manual session instead of relying on auto-start
    #[arg(long)]
    manual: bool,
}

#[derive(Deserialize)]
struct RecordedLog {
    #[serde(default)]
    samples: Vec<MotionSample>,
    #[serde(default)]
    fixes: Vec<GeoFix>,
}

/// Merged replay stream, ordered by timestamp.
enum Event {
    Sample(MotionSample),
    Fix(GeoFix),
}

impl Event {
    fn timestamp_ms(&self) -> u64 {
        match self {
            Event::Sample(s) => s.timestamp_ms,
            Event::Fix(f) => f.timestamp_ms,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(&args.log)
        .with_context(|| format!("cannot open log {}", args.log.display()))?;
    let log: RecordedLog =
        serde_json::from_reader(BufReader::new(file)).context("malformed log")?;

    let mut events: Vec<Event> = log
        .samples
        .into_iter()
        .map(Event::Sample)
        .chain(log.fixes.into_iter().map(Event::Fix))
        .collect();
    events.sort_by_key(Event::timestamp_ms);

    if events.is_empty() {
        println!("empty log, nothing to replay");
        return Ok(());
    }

    let mut config = TrackerConfig::default();
    config.sensitivity = args.sensitivity;
    config.body_weight_kg = args.weight_kg;

    let mut tracker = StepTracker::new(config, "replay");
    tracker.set_permission(step_tracker_rs::PermissionState::Granted);
    let (session_tx, mut session_rx) = unbounded_channel::<Session>();
    tracker.set_session_sink(session_tx);

    let first_ms = events[0].timestamp_ms();
    let last_ms = events.last().map(Event::timestamp_ms).unwrap_or(first_ms);

    if args.manual {
        tracker
            .start_manual(first_ms)
            .context("manual session start")?;
    }

    // Drive the heartbeat at the same 1s cadence the live loop uses, so
    // auto-start/auto-stop behave identically in replay.
    let mut next_tick_ms = first_ms;
    for event in &events {
        while next_tick_ms <= event.timestamp_ms() {
            tracker.on_tick(next_tick_ms);
            next_tick_ms += 1000;
        }
        match event {
            Event::Sample(sample) => tracker.on_motion_sample(sample),
            Event::Fix(fix) => {
                let generation = tracker.current_generation();
                tracker.on_geo_fix(generation, fix);
            }
        }
    }

    if args.manual {
        let steps = tracker.stop_manual(last_ms).context("manual session stop")?;
        println!("manual session: {} steps", steps);
    }

    let snapshot = tracker.snapshot(last_ms);
    println!("=== Replay Summary ===");
    println!("Span:          {:.1}s", (last_ms - first_ms) as f64 / 1000.0);
    println!("Daily steps:   {}", snapshot.daily_steps);
    println!("Backlog:       {}", snapshot.backlog_steps);

    let mut session_count = 0;
    while let Ok(session) = session_rx.try_recv() {
        session_count += 1;
        println!(
            "Session {}: {:?}, {} steps, {:.0}m, {}s, {:.1} kcal, {} route points",
            session.id,
            session.kind,
            session.step_count,
            session.distance_m,
            session.duration_s,
            session.calories_kcal,
            session.route.len()
        );
    }
    println!("Sessions finalized: {}", session_count);

    Ok(())
}
