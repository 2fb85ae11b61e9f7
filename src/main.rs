use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use step_tracker_rs::sensors::{self, current_epoch_ms, GeoFix, MotionSample};
use step_tracker_rs::{JsonStore, Session, StepStore, StepTracker, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "step_tracker")]
#[command(about = "Step tracking pipeline - live session over mock sensors", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Step detection sensitivity (1-5)
    #[arg(long, default_value = "3")]
    sensitivity: u8,

    /// Body weight in kilograms, for calorie estimates
    #[arg(long, default_value = "70.0")]
    weight_kg: f64,

    /// User id reported to the step store
    #[arg(long, default_value = "local")]
    user_id: String,

    /// Start a manual session for the whole run
    #[arg(long)]
    manual: bool,

    /// Output directory
    #[arg(long, default_value = "step_tracker_sessions")]
    output_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    log::info!("step tracker starting");
    log::info!("  duration: {}s (0=continuous)", args.duration);
    log::info!("  sensitivity: {}", args.sensitivity);
    log::info!("  output dir: {}", args.output_dir);

    let mut config = TrackerConfig::default();
    config.sensitivity = args.sensitivity;
    config.body_weight_kg = args.weight_kg;
    let sync_interval_ms = config.sync_interval_ms;

    let mut tracker = StepTracker::new(config, &args.user_id);
    let mut store = JsonStore::new(&args.output_dir)?;

    let permission = sensors::request_motion_permission().await;
    tracker.set_permission(permission);

    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<Session>();
    tracker.set_session_sink(session_tx);

    let (accel_tx, mut accel_rx) = mpsc::channel::<MotionSample>(500);
    let (gps_tx, mut gps_rx) = mpsc::channel::<GeoFix>(100);

    let _accel_handle = tokio::spawn(sensors::accel_loop(accel_tx));
    let _gps_handle = tokio::spawn(sensors::gps_loop(gps_tx));

    let start_ms = current_epoch_ms();
    if args.manual {
        tracker.start_manual(start_ms)?;
        log::info!("manual session started");
    }

    let mut last_tick_ms = start_ms;
    let mut last_sync_ms = start_ms;
    let mut last_status_ms = start_ms;

    loop {
        let now_ms = current_epoch_ms();

        if args.duration > 0 && now_ms.saturating_sub(start_ms) >= args.duration * 1000 {
            log::info!("duration reached, stopping");
            break;
        }

        while let Ok(sample) = accel_rx.try_recv() {
            tracker.on_motion_sample(&sample);
        }

        // The mock watch has no notion of re-subscription, so fixes always
        // carry the current generation.
        let generation = tracker.current_generation();
        while let Ok(fix) = gps_rx.try_recv() {
            tracker.on_geo_fix(generation, &fix);
        }

        while let Ok(session) = session_rx.try_recv() {
            persist_session(&mut store, &args.output_dir, &session);
        }

        if now_ms.saturating_sub(last_tick_ms) >= 1000 {
            tracker.on_tick(now_ms);
            last_tick_ms = now_ms;
        }

        if now_ms.saturating_sub(last_sync_ms) >= sync_interval_ms {
            // Failures keep the backlog and are retried next tick.
            let _ = tracker.on_sync_tick(&mut store);
            last_sync_ms = now_ms;
        }

        if now_ms.saturating_sub(last_status_ms) >= 2000 {
            let snapshot = tracker.snapshot(now_ms);
            let status_path = format!("{}/live_status.json", args.output_dir);
            if let Err(err) = snapshot.save(&status_path) {
                log::warn!("failed to save live status: {}", err);
            }
            last_status_ms = now_ms;
        }

        sleep(Duration::from_millis(5)).await;
    }

    let now_ms = current_epoch_ms();
    if args.manual {
        let final_steps = tracker.stop_manual(now_ms)?;
        log::info!("manual session stopped: {} steps", final_steps);
    }
    while let Ok(session) = session_rx.try_recv() {
        persist_session(&mut store, &args.output_dir, &session);
    }
    let _ = tracker.on_sync_tick(&mut store);

    let snapshot = tracker.snapshot(now_ms);
    println!("\n=== Final Stats ===");
    println!("Daily steps:    {}", snapshot.daily_steps);
    println!("Backlog steps:  {}", snapshot.backlog_steps);
    println!("Sync failures:  {}", snapshot.sync_failures);
    println!("Uptime:         {}s", snapshot.uptime_s);

    Ok(())
}

fn persist_session(store: &mut JsonStore, output_dir: &str, session: &Session) {
    log::info!(
        "persisting {:?} session {}: {} steps, {:.0}m",
        session.kind,
        session.id,
        session.step_count,
        session.distance_m
    );
    if let Err(err) = store.append_session(session) {
        log::warn!("failed to persist session {}: {}", session.id, err);
    }
    if !session.route.is_empty() {
        let gpx_path = format!("{}/{}.gpx", output_dir, session.id);
        if let Err(err) = std::fs::write(&gpx_path, session.to_gpx_xml()) {
            log::warn!("failed to write gpx {}: {}", gpx_path, err);
        }
    }
}
