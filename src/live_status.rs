use serde::{Deserialize, Serialize};
use std::fs;

use crate::sensors::PermissionState;
use crate::session::SessionKind;

/// Read-only snapshot of the tracker for external consumers (UI widgets,
/// coaching text, badges). Written as JSON on a short cadence.
#[derive(Serialize, Deserialize, Clone)]
pub struct StatusSnapshot {
    pub timestamp_ms: u64,
    pub daily_steps: u64,
    pub session_steps: u64,
    pub session_active: bool,
    pub session_kind: Option<SessionKind>,
    pub session_distance_m: f64,
    pub session_route_points: usize,
    pub permission: PermissionState,
    pub gps_healthy: bool,
    pub backlog_steps: u64,
    pub sync_failures: u64,
    pub uptime_s: u64,
}

impl StatusSnapshot {
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
