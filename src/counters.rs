/// Two independent monotonic counters fed by the same step-credit events.
///
/// The daily total only ever grows within a calendar day (the midnight
/// rollover is an external trigger); the session total lives between
/// `start_session` and `stop_session` and is zeroed at every start.
#[derive(Debug, Default)]
pub struct StepCounters {
    daily_total: u64,
    session_total: u64,
    session_active: bool,
}

impl StepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit confirmed steps. Daily always; session only while active.
    pub fn credit(&mut self, steps: u64) {
        self.daily_total += steps;
        if self.session_active {
            self.session_total += steps;
        }
    }

    pub fn start_session(&mut self) {
        self.session_total = 0;
        self.session_active = true;
    }

    /// Deactivate the session counter and return its final value.
    /// The daily total is untouched.
    pub fn stop_session(&mut self) -> u64 {
        self.session_active = false;
        self.session_total
    }

    /// Midnight rollover, driven by the host app's day-change signal.
    pub fn reset_daily(&mut self) {
        self.daily_total = 0;
    }

    pub fn daily_total(&self) -> u64 {
        self.daily_total
    }

    pub fn session_total(&self) -> u64 {
        self.session_total
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }
}
