//! Elapsed-time bookkeeping shared by the tick clock and the brake phases

use std::time::Instant;

/// Lower bound of the per-tick time-scale factor
pub const MIN_TIME_SCALE: f64 = 0.25;
/// Upper bound of the per-tick time-scale factor
pub const MAX_TIME_SCALE: f64 = 3.0;

/// Start/elapsed/reset timer anchored at an instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTimer {
    started_at: Instant,
}

impl PhaseTimer {
    pub fn start(now: Instant) -> Self {
        Self { started_at: now }
    }

    /// Milliseconds since the timer was started; zero if `now` predates the start
    pub fn elapsed_ms(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started_at).as_secs_f64() * 1000.0
    }

    pub fn reset(&mut self, now: Instant) {
        self.started_at = now;
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// Normalizes real tick spacing against the nominal interval
#[derive(Debug, Clone)]
pub struct TickClock {
    nominal_interval_ms: f64,
    last_tick: PhaseTimer,
}

impl TickClock {
    pub fn new(nominal_interval_ms: f64, now: Instant) -> Self {
        Self {
            nominal_interval_ms: nominal_interval_ms.max(1.0),
            last_tick: PhaseTimer::start(now),
        }
    }

    /// Records a tick at `now` and returns its clamped time-scale factor
    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed_ms = self.last_tick.elapsed_ms(now);
        self.last_tick.reset(now);
        time_scale(elapsed_ms, self.nominal_interval_ms)
    }

    pub fn nominal_interval_ms(&self) -> f64 {
        self.nominal_interval_ms
    }
}

/// Ratio of elapsed to nominal time, clamped to [0.25, 3.0]
pub fn time_scale(elapsed_ms: f64, nominal_interval_ms: f64) -> f64 {
    let nominal = nominal_interval_ms.max(1.0);
    let scale = elapsed_ms / nominal;
    if scale.is_nan() {
        return MIN_TIME_SCALE;
    }
    scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE)
}
