use crate::sensors::MotionSample;

/// Gravity removal and magnitude smoothing for raw accelerometer samples.
///
/// Two cascaded exponential filters: a slow per-axis low-pass tracks the
/// gravity component, the residual (linear acceleration) is reduced to its
/// Euclidean magnitude, and a faster low-pass on that magnitude knocks down
/// single-sample spikes before peak detection sees them.
pub struct MotionFilter {
    gravity: [f64; 3],
    smooth_mag: f64,
    alpha: f64,
    beta: f64,
    initialized: bool,
}

impl MotionFilter {
    pub fn new(alpha: f64, beta: f64) -> Self {
        MotionFilter {
            gravity: [0.0; 3],
            smooth_mag: 0.0,
            alpha,
            beta,
            initialized: false,
        }
    }

    /// Feed one raw sample, get the smoothed linear-acceleration magnitude.
    ///
    /// Pure function of (state, sample); no side effects beyond the filter's
    /// own fields.
    pub fn observe(&mut self, sample: &MotionSample) -> f64 {
        let raw = [sample.x, sample.y, sample.z];

        if !self.initialized {
            // Seed gravity with the first reading so the estimate does not
            // have to climb from zero through a huge fake transient.
            self.gravity = raw;
            self.initialized = true;
        } else {
            for axis in 0..3 {
                self.gravity[axis] =
                    self.alpha * self.gravity[axis] + (1.0 - self.alpha) * raw[axis];
            }
        }

        let linear = [
            raw[0] - self.gravity[0],
            raw[1] - self.gravity[1],
            raw[2] - self.gravity[2],
        ];
        let magnitude =
            (linear[0] * linear[0] + linear[1] * linear[1] + linear[2] * linear[2]).sqrt();

        self.smooth_mag = self.beta * self.smooth_mag + (1.0 - self.beta) * magnitude;
        self.smooth_mag
    }

    pub fn reset(&mut self) {
        self.gravity = [0.0; 3];
        self.smooth_mag = 0.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: u64, x: f64, y: f64, z: f64) -> MotionSample {
        MotionSample {
            timestamp_ms: t,
            x,
            y,
            z,
        }
    }

    #[test]
    fn test_constant_input_decays_to_zero() {
        let mut filter = MotionFilter::new(0.8, 0.7);
        let mut out = 0.0;
        for i in 0..200 {
            out = filter.observe(&sample(i * 20, 0.0, 0.0, 9.81));
        }
        // At rest the linear acceleration is pure gravity, fully absorbed.
        assert!(out < 1e-6, "resting magnitude should vanish, got {}", out);
    }

    #[test]
    fn test_spike_is_suppressed() {
        let mut filter = MotionFilter::new(0.8, 0.7);
        for i in 0..100 {
            filter.observe(&sample(i * 20, 0.0, 0.0, 9.81));
        }
        // Single 5 m/s² jolt on top of gravity.
        let out = filter.observe(&sample(2000, 0.0, 0.0, 14.81));
        // Gravity filter absorbs 20% of the jolt, magnitude filter keeps
        // only 30% of the rest: well under half survives one sample.
        assert!(out < 2.5, "spike should be attenuated, got {}", out);
        assert!(out > 0.5, "spike should still register, got {}", out);
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut filter = MotionFilter::new(0.8, 0.7);
            (0..50)
                .map(|i| filter.observe(&sample(i * 20, 0.1 * i as f64, 0.0, 9.81)))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = MotionFilter::new(0.8, 0.7);
        filter.observe(&sample(0, 1.0, 2.0, 9.0));
        filter.reset();
        assert!(!filter.initialized);
        assert_eq!(filter.smooth_mag, 0.0);
    }
}
