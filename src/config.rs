/// Tunables for the step pipeline and session lifecycle.
///
/// Defaults match the production phone app; the only knob normally exposed
/// to users is `sensitivity`.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Step detection sensitivity dial, 1 (least) to 5 (most sensitive).
    pub sensitivity: u8,
    /// Low-pass factor for the per-axis gravity estimate.
    pub gravity_alpha: f64,
    /// Low-pass factor for the linear-acceleration magnitude.
    pub magnitude_beta: f64,
    /// Refractory period between step candidates in milliseconds.
    pub min_step_delay_ms: u64,
    /// Gap between candidates that breaks a walking cadence.
    pub max_step_delay_ms: u64,
    /// Candidates required before the first batch of steps is credited.
    pub consecutive_steps_required: u32,
    /// GPS fixes with worse accuracy than this are discarded (meters).
    pub max_fix_accuracy_m: f64,
    /// Minimum movement to accept a fix during a manual session (meters).
    pub manual_min_move_m: f64,
    /// Minimum movement to accept a fix during an auto session (meters).
    pub auto_min_move_m: f64,
    /// Daily-step delta per evaluation window that auto-starts a session
    /// (strictly greater than).
    pub auto_start_step_delta: u64,
    /// Auto-start evaluation cadence in milliseconds.
    pub auto_eval_interval_ms: u64,
    /// Auto session stops after this long without an accepted fix.
    pub inactivity_timeout_ms: u64,
    /// Manual session is kept only above this step count (strictly greater)...
    pub manual_min_steps: u64,
    /// ...or above this duration in milliseconds (strictly greater).
    pub manual_min_duration_ms: u64,
    /// Auto session is kept only with more route points than this.
    pub auto_min_route_points: usize,
    /// Remote flush cadence in milliseconds.
    pub sync_interval_ms: u64,
    /// Body weight used for calorie estimation (kilograms).
    pub body_weight_kg: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sensitivity: 3,
            gravity_alpha: 0.8,
            magnitude_beta: 0.7,
            min_step_delay_ms: 280,    // rejects a footfall's ringing
            max_step_delay_ms: 1800,   // ~0.55 steps/sec, slower is not walking
            consecutive_steps_required: 6,
            max_fix_accuracy_m: 30.0,
            manual_min_move_m: 3.0,
            auto_min_move_m: 5.0,      // wider gate, drift while stationary
            auto_start_step_delta: 30,
            auto_eval_interval_ms: 60_000,
            inactivity_timeout_ms: 300_000,
            manual_min_steps: 10,
            manual_min_duration_ms: 30_000,
            auto_min_route_points: 5,
            sync_interval_ms: 10_000,
            body_weight_kg: 70.0,
        }
    }
}

impl TrackerConfig {
    /// Dynamic peak threshold derived from the sensitivity dial.
    /// Higher sensitivity lowers the bar a peak must clear.
    pub fn step_threshold(&self) -> f64 {
        let sensitivity = self.sensitivity.clamp(1, 5);
        1.4 - (sensitivity as i32 - 3) as f64 * 0.15
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_threshold() {
        let config = TrackerConfig::default();
        assert_relative_eq!(config.step_threshold(), 1.4);
    }

    #[test]
    fn test_sensitivity_lowers_threshold() {
        let mut config = TrackerConfig::default();
        config.sensitivity = 5;
        assert_relative_eq!(config.step_threshold(), 1.1);
        config.sensitivity = 1;
        assert_relative_eq!(config.step_threshold(), 1.7);
    }

    #[test]
    fn test_sensitivity_clamped() {
        let mut config = TrackerConfig::default();
        config.sensitivity = 9;
        assert_relative_eq!(config.step_threshold(), 1.1);
        config.sensitivity = 0;
        assert_relative_eq!(config.step_threshold(), 1.7);
    }
}
