use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

/// Raw accelerometer sample, gravity included, device axes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp_ms: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A geolocation fix as delivered by the platform watch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GeoFix {
    pub timestamp_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub speed_mps: Option<f64>,
}

/// Outcome of the motion-sensor permission request.
///
/// Denied is not an error: the pipeline simply never receives samples and
/// counters stay at their last value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Ask the platform for motion-sensor access.
///
/// On dev machines there is no permission broker; `STEP_TRACKER_DENY_MOTION`
/// simulates a user denial so the degraded path can be exercised.
pub async fn request_motion_permission() -> PermissionState {
    if std::env::var_os("STEP_TRACKER_DENY_MOTION").is_some() {
        log::warn!("motion permission denied (simulated)");
        return PermissionState::Denied;
    }
    PermissionState::Granted
}

pub async fn accel_loop(tx: Sender<MotionSample>) {
    let mut interval = interval(Duration::from_millis(20)); // ~50Hz sampling
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let sample = mock_motion_sample();

        match tx.try_send(sample) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    log::debug!("[accel] {} samples", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                log::info!("[accel] channel closed after {} samples", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}

pub async fn gps_loop(tx: Sender<GeoFix>) {
    let mut interval = interval(Duration::from_secs(2));
    let mut fix_count = 0u64;

    loop {
        interval.tick().await;

        let fix = mock_geo_fix();

        match tx.try_send(fix) {
            Ok(_) => {
                fix_count += 1;
                if fix_count % 30 == 0 {
                    log::debug!("[gps] {} fixes", fix_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                log::info!("[gps] channel closed after {} fixes", fix_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this fix
            }
        }
    }
}

/// Synthetic walking signal: a ~2 Hz bounce around gravity on the z axis.
fn mock_motion_sample() -> MotionSample {
    use std::f64::consts::PI;
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let t = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as f64 * 0.02;

    MotionSample {
        timestamp_ms: current_epoch_ms(),
        x: (t * 2.0 * PI).sin() * 0.4,
        y: (t * 2.0 * PI).cos() * 0.3,
        z: 9.81 + (t * 4.0 * PI).sin() * 2.2,
    }
}

/// Synthetic slow stroll near a fixed origin.
fn mock_geo_fix() -> GeoFix {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as f64;

    GeoFix {
        timestamp_ms: current_epoch_ms(),
        latitude: 37.7749 + seq * 0.00004,
        longitude: -122.4194 + seq * 0.00002,
        accuracy_m: 8.0 + (seq * 0.1).sin() * 4.0,
        speed_mps: Some(1.4 + (seq * 0.5).sin() * 0.3),
    }
}

pub fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
