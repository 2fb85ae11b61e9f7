use tokio::sync::mpsc::UnboundedSender;

use crate::config::TrackerConfig;
use crate::counters::StepCounters;
use crate::detector::StepDetector;
use crate::error::{TrackerError, TrackerResult};
use crate::filter::MotionFilter;
use crate::live_status::StatusSnapshot;
use crate::route::RouteRecorder;
use crate::sensors::{GeoFix, MotionSample, PermissionState};
use crate::session::{estimate_calories, Session, SessionKind};
use crate::sync::{StepStore, StoreError, SyncBuffer};

/// State owned by one recording session. Everything here is constructed at
/// session start and consumed at finalization; nothing leaks across
/// sessions.
struct ActiveSession {
    generation: u64,
    start_ms: u64,
    route: RouteRecorder,
    last_accepted_fix_ms: u64,
}

impl ActiveSession {
    fn new(generation: u64, start_ms: u64, max_accuracy_m: f64, min_move_m: f64) -> Self {
        ActiveSession {
            generation,
            start_ms,
            route: RouteRecorder::new(max_accuracy_m, min_move_m),
            last_accepted_fix_ms: start_ms,
        }
    }
}

/// Session lifecycle. Manual and auto recording are mutually exclusive and
/// each owns exactly the state of its variant.
enum TrackerState {
    Idle,
    ManualRecording(ActiveSession),
    AutoRecording(ActiveSession),
}

/// The core pipeline: motion samples in, step credits fanned out to the
/// daily/session counters and the sync backlog, GPS fixes into the active
/// session's route, and an explicit state machine deciding when sessions
/// start and stop.
///
/// All methods are synchronous and expect to be called from a single event
/// loop; callers pass explicit `now_ms` so behavior is deterministic and
/// testable.
pub struct StepTracker {
    config: TrackerConfig,
    filter: MotionFilter,
    detector: StepDetector,
    counters: StepCounters,
    sync: SyncBuffer,
    state: TrackerState,
    /// Bumped on every session start; stale GPS callbacks carry the old
    /// value and are dropped instead of leaking into a new session.
    generation: u64,
    last_auto_eval_ms: Option<u64>,
    daily_at_last_eval: u64,
    permission: PermissionState,
    gps_healthy: bool,
    started_ms: Option<u64>,
    session_tx: Option<UnboundedSender<Session>>,
}

impl StepTracker {
    pub fn new(config: TrackerConfig, user_id: &str) -> Self {
        let filter = MotionFilter::new(config.gravity_alpha, config.magnitude_beta);
        let detector = StepDetector::new(&config);
        StepTracker {
            filter,
            detector,
            counters: StepCounters::new(),
            sync: SyncBuffer::new(user_id),
            state: TrackerState::Idle,
            generation: 0,
            last_auto_eval_ms: None,
            daily_at_last_eval: 0,
            permission: PermissionState::Unknown,
            gps_healthy: true,
            started_ms: None,
            session_tx: None,
            config,
        }
    }

    /// Register the sink that receives every finalized significant session.
    pub fn set_session_sink(&mut self, tx: UnboundedSender<Session>) {
        self.session_tx = Some(tx);
    }

    pub fn set_permission(&mut self, permission: PermissionState) {
        self.permission = permission;
    }

    /// Generation id of the current session, for tagging GPS subscriptions.
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// Ingest one raw accelerometer sample. This is the hot path and stays
    /// synchronous: filter, detect, credit.
    pub fn on_motion_sample(&mut self, sample: &MotionSample) {
        if self.permission == PermissionState::Denied {
            return;
        }
        self.note_started(sample.timestamp_ms);

        let smooth_mag = self.filter.observe(sample);
        if let Some(batch) = self.detector.observe(smooth_mag, sample.timestamp_ms) {
            self.credit(batch.steps as u64);
        }
    }

    /// Fan one step-credit event out to both counters and the sync backlog
    /// in the same synchronous call, so a flush can never observe one
    /// without the other.
    fn credit(&mut self, steps: u64) {
        self.counters.credit(steps);
        self.sync.accumulate(steps);
    }

    /// Deliver a GPS fix tagged with the generation the watch was started
    /// under. A stale generation means the fix raced a session stop; it
    /// must not be absorbed by a just-started new session.
    pub fn on_geo_fix(&mut self, generation: u64, fix: &GeoFix) {
        self.gps_healthy = true;
        let active = match &mut self.state {
            TrackerState::Idle => return,
            TrackerState::ManualRecording(active) | TrackerState::AutoRecording(active) => active,
        };
        if generation != active.generation {
            log::debug!(
                "[tracker] dropping stale fix (generation {} != {})",
                generation,
                active.generation
            );
            return;
        }
        if active.route.observe(fix) {
            // Genuine movement: the auto-stop inactivity timer restarts.
            active.last_accepted_fix_ms = fix.timestamp_ms;
        }
    }

    /// Geolocation watch errored or timed out. The session continues on
    /// step counts alone; only the snapshot flag degrades.
    pub fn on_gps_error(&mut self) {
        if self.gps_healthy {
            log::warn!("[tracker] gps unavailable, continuing indoor");
        }
        self.gps_healthy = false;
    }

    /// Periodic heartbeat from the event loop (once per second is plenty).
    /// Drives the auto-stop inactivity timeout and the once-per-minute
    /// auto-start evaluation.
    pub fn on_tick(&mut self, now_ms: u64) {
        self.note_started(now_ms);

        if let TrackerState::AutoRecording(active) = &self.state {
            let quiet_ms = now_ms.saturating_sub(active.last_accepted_fix_ms);
            if quiet_ms >= self.config.inactivity_timeout_ms {
                log::info!("[tracker] auto session inactive for {}s, stopping", quiet_ms / 1000);
                self.finalize(now_ms);
            }
        }

        match self.last_auto_eval_ms {
            None => {
                self.last_auto_eval_ms = Some(now_ms);
                self.daily_at_last_eval = self.counters.daily_total();
            }
            Some(last) if now_ms.saturating_sub(last) >= self.config.auto_eval_interval_ms => {
                let delta = self.counters.daily_total() - self.daily_at_last_eval;
                self.last_auto_eval_ms = Some(now_ms);
                self.daily_at_last_eval = self.counters.daily_total();

                // Strictly greater than: a delta of exactly the limit is
                // not a walk.
                if delta > self.config.auto_start_step_delta
                    && matches!(self.state, TrackerState::Idle)
                {
                    log::info!("[tracker] {} steps in the last window, auto-starting", delta);
                    self.start_auto(now_ms);
                }
            }
            Some(_) => {}
        }
    }

    /// Explicit user start. Pre-empts a running auto session: the auto
    /// session is finalized first, then the manual one begins.
    pub fn start_manual(&mut self, now_ms: u64) -> TrackerResult<()> {
        match self.state {
            TrackerState::ManualRecording(_) => return Err(TrackerError::AlreadyRunning),
            TrackerState::AutoRecording(_) => {
                log::info!("[tracker] manual start pre-empts auto session");
                self.finalize(now_ms);
            }
            TrackerState::Idle => {}
        }

        self.generation += 1;
        self.counters.start_session();
        self.state = TrackerState::ManualRecording(ActiveSession::new(
            self.generation,
            now_ms,
            self.config.max_fix_accuracy_m,
            self.config.manual_min_move_m,
        ));
        log::info!("[tracker] manual session started (generation {})", self.generation);
        Ok(())
    }

    /// Explicit user stop. Returns the final session step count even when
    /// the session falls below significance and is not persisted.
    pub fn stop_manual(&mut self, now_ms: u64) -> TrackerResult<u64> {
        if !matches!(self.state, TrackerState::ManualRecording(_)) {
            return Err(TrackerError::NotRunning);
        }
        Ok(self.finalize(now_ms))
    }

    fn start_auto(&mut self, now_ms: u64) {
        self.generation += 1;
        self.counters.start_session();
        self.state = TrackerState::AutoRecording(ActiveSession::new(
            self.generation,
            now_ms,
            self.config.max_fix_accuracy_m,
            self.config.auto_min_move_m,
        ));
        log::info!("[tracker] auto session started (generation {})", self.generation);
    }

    /// Tear down the active session, assemble the record, and emit it if it
    /// clears the significance bar. Returns the final step count.
    fn finalize(&mut self, now_ms: u64) -> u64 {
        let state = std::mem::replace(&mut self.state, TrackerState::Idle);
        let (kind, active) = match state {
            TrackerState::ManualRecording(active) => (SessionKind::Manual, active),
            TrackerState::AutoRecording(active) => (SessionKind::Auto, active),
            TrackerState::Idle => return 0,
        };

        let step_count = self.counters.stop_session();
        let distance_m = active.route.distance_m();
        let duration_s = now_ms.saturating_sub(active.start_ms) / 1000;
        let session = Session {
            id: format!("session_{}", active.start_ms),
            kind,
            start_ms: active.start_ms,
            end_ms: now_ms,
            step_count,
            distance_m,
            duration_s,
            calories_kcal: estimate_calories(step_count, distance_m, self.config.body_weight_kg),
            route: active.route.into_points(),
        };

        if session.is_significant(&self.config) {
            log::info!(
                "[tracker] {:?} session finalized: {} steps, {:.0}m, {}s",
                session.kind,
                session.step_count,
                session.distance_m,
                session.duration_s
            );
            if let Some(tx) = &self.session_tx {
                let _ = tx.send(session);
            }
        } else {
            log::debug!(
                "[tracker] {:?} session below significance, discarded ({} steps, {} points)",
                session.kind,
                session.step_count,
                session.route.len()
            );
        }

        step_count
    }

    /// One flush attempt against the persistence store. Failures are logged
    /// inside the buffer and retried on the next tick; callers may ignore
    /// the result.
    pub fn on_sync_tick(&mut self, store: &mut dyn StepStore) -> Result<(), StoreError> {
        self.sync.flush(store)
    }

    /// Midnight rollover signal from the host app. The auto-start baseline
    /// rolls with the counter, otherwise the next evaluation window would
    /// compare against yesterday's total.
    pub fn reset_daily(&mut self) {
        self.counters.reset_daily();
        self.daily_at_last_eval = 0;
    }

    pub fn snapshot(&self, now_ms: u64) -> StatusSnapshot {
        let (session_kind, distance_m, route_points) = match &self.state {
            TrackerState::Idle => (None, 0.0, 0),
            TrackerState::ManualRecording(active) => (
                Some(SessionKind::Manual),
                active.route.distance_m(),
                active.route.points().len(),
            ),
            TrackerState::AutoRecording(active) => (
                Some(SessionKind::Auto),
                active.route.distance_m(),
                active.route.points().len(),
            ),
        };

        StatusSnapshot {
            timestamp_ms: now_ms,
            daily_steps: self.counters.daily_total(),
            session_steps: self.counters.session_total(),
            session_active: self.counters.session_active(),
            session_kind,
            session_distance_m: distance_m,
            session_route_points: route_points,
            permission: self.permission,
            gps_healthy: self.gps_healthy,
            backlog_steps: self.sync.backlog(),
            sync_failures: self.sync.failure_count(),
            uptime_s: self
                .started_ms
                .map(|t| now_ms.saturating_sub(t) / 1000)
                .unwrap_or(0),
        }
    }

    fn note_started(&mut self, now_ms: u64) {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn tracker() -> (StepTracker, UnboundedReceiver<Session>) {
        let (tx, rx) = unbounded_channel();
        let mut tracker = StepTracker::new(TrackerConfig::default(), "user-1");
        tracker.set_session_sink(tx);
        tracker.set_permission(PermissionState::Granted);
        (tracker, rx)
    }

    fn fix_at(lat: f64, t: u64) -> GeoFix {
        GeoFix {
            timestamp_ms: t,
            latitude: lat,
            longitude: -122.0,
            accuracy_m: 5.0,
            speed_mps: Some(1.4),
        }
    }

    /// Walk signal: 1 Hz vertical sine, strong enough to clear the
    /// threshold after gravity removal, sampled at 50 Hz.
    fn feed_walk(tracker: &mut StepTracker, start_ms: u64, seconds: u64) {
        use std::f64::consts::PI;
        let samples = seconds * 50;
        for i in 0..samples {
            let t_ms = start_ms + i * 20;
            let t_s = i as f64 * 0.02;
            tracker.on_motion_sample(&MotionSample {
                timestamp_ms: t_ms,
                x: 0.0,
                y: 0.0,
                z: 9.81 + 8.0 * (t_s * 2.0 * PI).sin(),
            });
        }
    }

    #[test]
    fn test_walk_signal_credits_steps() {
        let (mut tracker, _rx) = tracker();
        feed_walk(&mut tracker, 1000, 12);
        let snapshot = tracker.snapshot(13_000);
        assert!(
            snapshot.daily_steps >= 6,
            "sustained cadence should clear the warm-up gate, got {}",
            snapshot.daily_steps
        );
        // Fan-out invariant: every credited step is also in the backlog.
        assert_eq!(snapshot.backlog_steps, snapshot.daily_steps);
    }

    #[test]
    fn test_permission_denied_freezes_counters() {
        let (mut tracker, _rx) = tracker();
        tracker.set_permission(PermissionState::Denied);
        feed_walk(&mut tracker, 1000, 12);
        assert_eq!(tracker.snapshot(13_000).daily_steps, 0);
    }

    #[test]
    fn test_manual_lifecycle_and_errors() {
        let (mut tracker, _rx) = tracker();
        assert!(matches!(
            tracker.stop_manual(1000),
            Err(TrackerError::NotRunning)
        ));
        tracker.start_manual(1000).unwrap();
        assert!(matches!(
            tracker.start_manual(2000),
            Err(TrackerError::AlreadyRunning)
        ));
        let steps = tracker.stop_manual(3000).unwrap();
        assert_eq!(steps, 0);
    }

    #[test]
    fn test_insignificant_manual_discarded_but_count_returned() {
        let (mut tracker, mut rx) = tracker();
        tracker.start_manual(1000).unwrap();
        tracker.credit(5);
        // 10 seconds, 5 steps: below both significance bars.
        let steps = tracker.stop_manual(11_000).unwrap();
        assert_eq!(steps, 5);
        assert!(rx.try_recv().is_err(), "insignificant session must not emit");
    }

    #[test]
    fn test_significant_manual_emitted() {
        let (mut tracker, mut rx) = tracker();
        tracker.start_manual(1000).unwrap();
        tracker.credit(6);
        tracker.credit(6);
        let steps = tracker.stop_manual(21_000).unwrap();
        assert_eq!(steps, 12);

        let session = rx.try_recv().expect("session should be emitted");
        assert_eq!(session.kind, SessionKind::Manual);
        assert_eq!(session.step_count, 12);
        assert_eq!(session.duration_s, 20);
        // 12 steps at the default 70kg.
        assert!((session.calories_kcal - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_session_total_isolated_from_daily() {
        let (mut tracker, _rx) = tracker();
        tracker.credit(100);
        tracker.start_manual(1000).unwrap();
        tracker.credit(40);
        let steps = tracker.stop_manual(120_000).unwrap();
        assert_eq!(steps, 40);
        assert_eq!(tracker.snapshot(120_000).daily_steps, 140);
    }

    #[test]
    fn test_auto_start_requires_strictly_more_than_30() {
        let (mut tracker, _rx) = tracker();
        tracker.on_tick(0); // establish the evaluation baseline

        tracker.credit(30);
        tracker.on_tick(60_000);
        assert!(
            matches!(tracker.state, TrackerState::Idle),
            "exactly 30 must not auto-start"
        );

        tracker.credit(31);
        tracker.on_tick(120_000);
        assert!(matches!(tracker.state, TrackerState::AutoRecording(_)));
    }

    #[test]
    fn test_daily_rollover_resets_evaluation_baseline() {
        let (mut tracker, _rx) = tracker();
        tracker.on_tick(0);
        tracker.credit(100);
        tracker.on_tick(60_000); // walk detected, baseline captured at 100
        assert!(matches!(tracker.state, TrackerState::AutoRecording(_)));

        // Midnight: the counter drops below the captured baseline. The
        // next evaluation must not underflow.
        tracker.reset_daily();
        tracker.on_tick(120_000);
        assert_eq!(tracker.snapshot(120_000).daily_steps, 0);

        // Quiet night: the auto session times out, and a small
        // post-rollover delta does not start a new one.
        tracker.credit(20);
        tracker.on_tick(460_000);
        assert!(
            matches!(tracker.state, TrackerState::Idle),
            "20 steps since rollover must not auto-start"
        );

        // A real walk the next morning still triggers.
        tracker.credit(31);
        tracker.on_tick(520_000);
        assert!(matches!(tracker.state, TrackerState::AutoRecording(_)));
    }

    #[test]
    fn test_auto_eval_is_per_window_not_cumulative() {
        let (mut tracker, _rx) = tracker();
        tracker.on_tick(0);
        // 20 steps per minute for three minutes: never >30 in one window.
        for minute in 1..=3u64 {
            tracker.credit(20);
            tracker.on_tick(minute * 60_000);
            assert!(matches!(tracker.state, TrackerState::Idle));
        }
    }

    #[test]
    fn test_auto_stop_after_inactivity() {
        let (mut tracker, mut rx) = tracker();
        tracker.start_auto(0);
        let generation = tracker.current_generation();
        // Seed a significant route, then go quiet.
        for i in 0..7u64 {
            tracker.on_geo_fix(generation, &fix_at(37.0 + i as f64 * 0.0001, i * 1000));
        }
        tracker.on_tick(6_000 + 299_999);
        assert!(matches!(tracker.state, TrackerState::AutoRecording(_)));
        tracker.on_tick(6_000 + 300_000);
        assert!(matches!(tracker.state, TrackerState::Idle));

        let session = rx.try_recv().expect("significant auto session emitted");
        assert_eq!(session.kind, SessionKind::Auto);
        assert_eq!(session.route.len(), 7);
    }

    #[test]
    fn test_accepted_fixes_keep_auto_session_alive() {
        // One accepted fix every 250s forever: the session must never stop.
        let (mut tracker, _rx) = tracker();
        tracker.start_auto(0);
        let generation = tracker.current_generation();
        for i in 1..=20u64 {
            let t = i * 250_000;
            tracker.on_geo_fix(generation, &fix_at(37.0 + i as f64 * 0.001, t));
            tracker.on_tick(t + 249_000);
            assert!(
                matches!(tracker.state, TrackerState::AutoRecording(_)),
                "stopped at iteration {}",
                i
            );
        }
    }

    #[test]
    fn test_rejected_fixes_do_not_reset_inactivity() {
        let (mut tracker, _rx) = tracker();
        tracker.start_auto(0);
        let generation = tracker.current_generation();
        tracker.on_geo_fix(generation, &fix_at(37.0, 0));
        // Jitter around the seed point: observed but never accepted.
        for i in 1..=10u64 {
            tracker.on_geo_fix(generation, &fix_at(37.000001, i * 25_000));
        }
        tracker.on_tick(300_000);
        assert!(matches!(tracker.state, TrackerState::Idle));
    }

    #[test]
    fn test_stale_generation_fix_dropped() {
        let (mut tracker, _rx) = tracker();
        tracker.start_manual(0).unwrap();
        let old_generation = tracker.current_generation();
        tracker.stop_manual(1000).unwrap();
        tracker.start_manual(2000).unwrap();

        // Late fix from the previous watch subscription.
        tracker.on_geo_fix(old_generation, &fix_at(37.0, 2100));
        if let TrackerState::ManualRecording(active) = &tracker.state {
            assert!(active.route.points().is_empty());
        } else {
            panic!("expected manual session");
        }
    }

    #[test]
    fn test_manual_preempts_auto() {
        let (mut tracker, mut rx) = tracker();
        tracker.start_auto(0);
        let generation = tracker.current_generation();
        for i in 0..7u64 {
            tracker.on_geo_fix(generation, &fix_at(37.0 + i as f64 * 0.0001, i * 1000));
        }

        tracker.start_manual(10_000).unwrap();
        assert!(matches!(tracker.state, TrackerState::ManualRecording(_)));
        let session = rx.try_recv().expect("pre-empted auto session emitted");
        assert_eq!(session.kind, SessionKind::Auto);
        // The new manual session starts from a clean slate.
        assert_eq!(tracker.snapshot(10_000).session_steps, 0);
    }

    #[test]
    fn test_gps_error_degrades_snapshot_only() {
        let (mut tracker, _rx) = tracker();
        tracker.start_manual(0).unwrap();
        tracker.on_gps_error();
        let snapshot = tracker.snapshot(1000);
        assert!(!snapshot.gps_healthy);
        assert!(snapshot.session_active);
    }

    #[test]
    fn test_snapshot_reflects_active_route() {
        let (mut tracker, _rx) = tracker();
        tracker.start_manual(0).unwrap();
        let generation = tracker.current_generation();
        tracker.on_geo_fix(generation, &fix_at(37.0, 1000));
        tracker.on_geo_fix(generation, &fix_at(37.0001, 2000));
        let snapshot = tracker.snapshot(3000);
        assert_eq!(snapshot.session_route_points, 2);
        assert!(snapshot.session_distance_m > 10.0);
        assert_eq!(snapshot.session_kind, Some(SessionKind::Manual));
    }
}
