use crate::config::TrackerConfig;

/// One or more confirmed steps, emitted at the same instant.
///
/// The warm-up gate holds back the first candidates of a walk; when it
/// opens, the whole batch is credited atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBatch {
    pub timestamp_ms: u64,
    pub steps: u32,
}

/// Turns the smoothed magnitude stream into debounced step events.
///
/// A candidate is a downward-crossing peak: the previous magnitude exceeded
/// the dynamic threshold and the current one is falling below it, with a
/// refractory period since the last candidate. Candidates only become steps
/// once a walking cadence is established (`consecutive_steps_required` in a
/// row without a cadence-breaking gap); the first batch is then credited at
/// once and every later in-cadence candidate counts 1:1. This rejects short
/// bursts of non-walking motion while still counting every step of a real
/// walk after the warm-up.
pub struct StepDetector {
    threshold: f64,
    min_step_delay_ms: u64,
    max_step_delay_ms: u64,
    required: u32,

    prev_mag: f64,
    last_candidate_ms: Option<u64>,
    consecutive: u32,
    total_steps: u64,
}

impl StepDetector {
    pub fn new(config: &TrackerConfig) -> Self {
        StepDetector {
            threshold: config.step_threshold(),
            min_step_delay_ms: config.min_step_delay_ms,
            max_step_delay_ms: config.max_step_delay_ms,
            required: config.consecutive_steps_required,
            prev_mag: 0.0,
            last_candidate_ms: None,
            consecutive: 0,
            total_steps: 0,
        }
    }

    /// Observe one smoothed magnitude. Returns confirmed steps, if any.
    pub fn observe(&mut self, smooth_mag: f64, now_ms: u64) -> Option<StepBatch> {
        let peaked = self.prev_mag > self.threshold && smooth_mag < self.prev_mag;
        self.prev_mag = smooth_mag;

        if !peaked {
            return None;
        }

        if let Some(last) = self.last_candidate_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < self.min_step_delay_ms {
                // Still inside the refractory window, this is the same
                // footfall ringing.
                return None;
            }
            if elapsed > self.max_step_delay_ms {
                // Cadence broke, the earlier candidates were not a walk.
                self.consecutive = 0;
            }
        }

        self.last_candidate_ms = Some(now_ms);
        self.consecutive += 1;

        let steps = if self.consecutive == self.required {
            self.required
        } else if self.consecutive > self.required {
            1
        } else {
            return None;
        };

        self.total_steps += steps as u64;
        Some(StepBatch {
            timestamp_ms: now_ms,
            steps,
        })
    }

    /// Lifetime confirmed steps, for diagnostics.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn reset(&mut self) {
        self.prev_mag = 0.0;
        self.last_candidate_ms = None;
        self.consecutive = 0;
    }
}
