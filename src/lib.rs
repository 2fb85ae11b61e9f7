//! Step Tracker core library
//!
//! Converts a noisy accelerometer stream and optional GPS fixes into
//! debounced step counts, routes, and finished activity sessions:
//!
//! - `filter` removes gravity and smooths the linear-acceleration magnitude
//! - `detector` turns the magnitude stream into debounced step events with a
//!   cadence warm-up gate against non-walking motion
//! - `counters` keeps the all-day and active-session totals
//! - `route` filters GPS jitter and accumulates haversine distance
//! - `tracker` owns the session state machine (idle / manual / auto) and
//!   fans step credits out to the counters and the sync backlog
//! - `sync` flushes unconfirmed step deltas to a persistence store with a
//!   capture-then-zero, add-back-on-failure discipline
//!
//! Everything is driven from a single event loop; the library itself never
//! spawns tasks. The binaries wire sensors to the tracker over tokio
//! channels.

pub mod config;
pub mod counters;
pub mod detector;
pub mod error;
pub mod filter;
pub mod live_status;
pub mod route;
pub mod sensors;
pub mod session;
pub mod sync;
pub mod tracker;

pub use config::TrackerConfig;
pub use counters::StepCounters;
pub use detector::{StepBatch, StepDetector};
pub use error::{TrackerError, TrackerResult};
pub use filter::MotionFilter;
pub use live_status::StatusSnapshot;
pub use route::{haversine_m, RoutePoint, RouteRecorder};
pub use sensors::{GeoFix, MotionSample, PermissionState};
pub use session::{Session, SessionKind};
pub use sync::{JsonStore, StepStore, StoreError, SyncBuffer};
pub use tracker::StepTracker;
