use serde::{Deserialize, Serialize};

use crate::sensors::GeoFix;

/// One accepted point of a session's route. Append-only while the session
/// runs, immutable after finalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: u64,
    pub speed_mps: Option<f64>,
}

/// Great-circle distance in meters (haversine, R = 6371 km).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const R: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    R * c
}

/// Filters GPS jitter and accumulates traveled distance.
///
/// A fix is accepted when its reported accuracy is good enough and it moved
/// at least `min_move_m` from the last accepted point; the first fix always
/// seeds the route. Everything else is drift, not movement.
pub struct RouteRecorder {
    points: Vec<RoutePoint>,
    distance_m: f64,
    max_accuracy_m: f64,
    min_move_m: f64,
}

impl RouteRecorder {
    pub fn new(max_accuracy_m: f64, min_move_m: f64) -> Self {
        RouteRecorder {
            points: Vec::new(),
            distance_m: 0.0,
            max_accuracy_m,
            min_move_m,
        }
    }

    /// Observe a fix. Returns true iff it was accepted as genuine movement.
    pub fn observe(&mut self, fix: &GeoFix) -> bool {
        if fix.accuracy_m > self.max_accuracy_m {
            log::debug!(
                "[route] fix discarded, accuracy {:.1}m > {:.1}m",
                fix.accuracy_m,
                self.max_accuracy_m
            );
            return false;
        }

        let point = RoutePoint {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp_ms: fix.timestamp_ms,
            speed_mps: fix.speed_mps,
        };

        match self.points.last() {
            None => {
                self.points.push(point);
                true
            }
            Some(last) => {
                let dist = haversine_m(
                    last.latitude,
                    last.longitude,
                    fix.latitude,
                    fix.longitude,
                );
                if dist > self.min_move_m {
                    self.distance_m += dist;
                    self.points.push(point);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Hand the accumulated route over for session finalization.
    pub fn into_points(self) -> Vec<RoutePoint> {
        self.points
    }
}
