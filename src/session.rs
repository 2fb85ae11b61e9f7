use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::route::RoutePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    Manual,
    Auto,
}

/// A finished activity session, fully populated at stop time and handed off
/// to persistence; the tracker keeps no reference afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub start_ms: u64,
    pub end_ms: u64,
    pub step_count: u64,
    pub distance_m: f64,
    pub duration_s: u64,
    pub calories_kcal: f64,
    pub route: Vec<RoutePoint>,
}

impl Session {
    /// Whether the session clears the minimum-significance bar for its kind.
    /// Most gesture-triggered "sessions" fail this and are silently dropped.
    pub fn is_significant(&self, config: &TrackerConfig) -> bool {
        match self.kind {
            SessionKind::Manual => {
                self.step_count > config.manual_min_steps
                    || self.end_ms.saturating_sub(self.start_ms) > config.manual_min_duration_ms
            }
            SessionKind::Auto => self.route.len() > config.auto_min_route_points,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// GPX track of the accepted route, for mapping applications.
    pub fn to_gpx_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"StepTracker\">\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", self.id));
        xml.push_str("    <trkseg>\n");

        for point in &self.route {
            let time = chrono::DateTime::<chrono::Utc>::from(
                std::time::UNIX_EPOCH
                    + std::time::Duration::from_millis(point.timestamp_ms),
            )
            .to_rfc3339();
            xml.push_str(&format!(
                "      <trkpt lat=\"{}\" lon=\"{}\">\n",
                point.latitude, point.longitude
            ));
            xml.push_str(&format!("        <time>{}</time>\n", time));
            xml.push_str("      </trkpt>\n");
        }

        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");

        xml
    }
}

/// Calorie estimate for a finished session.
///
/// Step-driven sessions use the per-step formula, GPS-only sessions fall
/// back to the distance formula. The two are not reconciled with each other;
/// that mirrors the product's current behavior and is tracked as a product
/// question, not silently unified here.
pub fn estimate_calories(step_count: u64, distance_m: f64, body_weight_kg: f64) -> f64 {
    if step_count > 0 {
        0.04 * step_count as f64 * (body_weight_kg / 70.0)
    } else {
        0.57 * body_weight_kg * (distance_m / 1000.0)
    }
}
