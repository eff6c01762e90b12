//! Four-phase brake model
//!
//! ```text
//!            press                hold elapsed
//!   Idle ───────────► Apply ─────────────────► Release
//!    ▲                  │                         │
//!    │ hold elapsed     │ release                 │ release
//!    │                  ▼                         │
//!    └──────────── PostReleaseHold ◄──────────────┘
//!                       │   ▲
//!                 press └───┘ (re-enters Apply)
//! ```
//!
//! Each phase carries only its own timer or anchor, so a phase entered a
//! second time always starts from a fresh snapshot.

use crate::config::{BrakeConfig, DriveConfig};
use crate::shaping::timing::PhaseTimer;
use std::time::Instant;

/// Value/time snapshot taken when the eased release begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseAnchor {
    pub timer: PhaseTimer,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BrakePhase {
    /// Released, decaying toward zero
    #[default]
    Idle,
    /// Pressed and ramping up; timer measures time since the press
    Apply { pressed: PhaseTimer },
    /// Pressed past the hold window, easing down to the dynamic minimum
    Release { anchor: PhaseAnchor },
    /// Just released; level pinned at the hysteresis ratio
    PostReleaseHold { hold: PhaseTimer },
}

/// Per-tick inputs of the brake model
#[derive(Debug, Clone, Copy)]
pub struct BrakeInput {
    pub engaged: bool,
    pub steering_ratio: f64,
    pub time_scale: f64,
    pub now: Instant,
}

impl BrakePhase {
    pub fn is_active(&self) -> bool {
        matches!(self, BrakePhase::Apply { .. } | BrakePhase::Release { .. })
    }

    /// Computes the next phase and the brake level for this tick
    pub fn step(self, level: f64, input: &BrakeInput, config: &DriveConfig) -> (BrakePhase, f64) {
        let brake = &config.brake;

        let (next, level) = if input.engaged {
            let dyn_min = dynamic_minimum(input.steering_ratio, brake);
            match self {
                BrakePhase::Apply { pressed } => apply(pressed, level, dyn_min, input, config),
                BrakePhase::Release { anchor } => {
                    (BrakePhase::Release { anchor }, release(&anchor, dyn_min, input.now, brake))
                }
                BrakePhase::Idle | BrakePhase::PostReleaseHold { .. } => {
                    apply(PhaseTimer::start(input.now), level, dyn_min, input, config)
                }
            }
        } else {
            match self {
                BrakePhase::Apply { .. } | BrakePhase::Release { .. } => (
                    BrakePhase::PostReleaseHold {
                        hold: PhaseTimer::start(input.now),
                    },
                    level.max(brake.after_release_hold_ratio),
                ),
                BrakePhase::PostReleaseHold { hold } => {
                    if hold.elapsed_ms(input.now) >= f64::from(brake.after_release_hold_ms) {
                        (BrakePhase::Idle, decay(level, input.time_scale, config))
                    } else {
                        (
                            BrakePhase::PostReleaseHold { hold },
                            brake.after_release_hold_ratio,
                        )
                    }
                }
                BrakePhase::Idle => (BrakePhase::Idle, decay(level, input.time_scale, config)),
            }
        };

        (next, level.clamp(0.0, 1.0))
    }
}

fn apply(
    pressed: PhaseTimer,
    level: f64,
    dyn_min: f64,
    input: &BrakeInput,
    config: &DriveConfig,
) -> (BrakePhase, f64) {
    let brake = &config.brake;
    if pressed.elapsed_ms(input.now) < f64::from(brake.hold_ms) {
        let fast_apply = config.rate_from_time(1.0, brake.fast_apply_ms) * input.time_scale;
        let level = (level + fast_apply).clamp(dyn_min, 1.0);
        return (BrakePhase::Apply { pressed }, level);
    }

    let anchor = PhaseAnchor {
        timer: PhaseTimer::start(input.now),
        value: level,
    };
    (
        BrakePhase::Release { anchor },
        release(&anchor, dyn_min, input.now, brake),
    )
}

fn release(anchor: &PhaseAnchor, dyn_min: f64, now: Instant, brake: &BrakeConfig) -> f64 {
    let total = f64::from(brake.release_total_ms.max(1));
    let progress = (anchor.timer.elapsed_ms(now) / total).clamp(0.0, 1.0);
    let shaped = progress.powf(brake.release_accel_exponent.max(0.1));
    let target = anchor.value - shaped * (anchor.value - dyn_min);
    target.clamp(dyn_min, 1.0)
}

fn decay(level: f64, time_scale: f64, config: &DriveConfig) -> f64 {
    let fast_release = config.rate_from_time(1.0, config.brake.fast_release_ms) * time_scale;
    (level - fast_release).max(0.0)
}

/// Brake floor while actively braking
///
/// With trail braking the floor rises from `min_ratio_base` toward
/// `min_ratio_max` as `steering_ratio^curve_exponent`.
pub fn dynamic_minimum(steering_ratio: f64, brake: &BrakeConfig) -> f64 {
    let floor = if brake.trail_enabled {
        let shaped = steering_ratio.clamp(0.0, 1.0).powf(brake.curve_exponent);
        brake.min_ratio_base + (brake.min_ratio_max - brake.min_ratio_base) * shaped
    } else {
        brake.min_ratio_base
    };
    floor.clamp(0.0, 1.0)
}

/// Owns the brake phase and level between ticks
#[derive(Debug, Clone, Default)]
pub struct BrakeStateMachine {
    phase: BrakePhase,
    level: f64,
}

impl BrakeStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        engaged: bool,
        steering_ratio: f64,
        now: Instant,
        time_scale: f64,
        config: &DriveConfig,
    ) -> f64 {
        let input = BrakeInput {
            engaged,
            steering_ratio,
            time_scale,
            now,
        };
        let (phase, level) = self.phase.step(self.level, &input, config);
        self.phase = phase;
        self.level = level;
        level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn phase(&self) -> &BrakePhase {
        &self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(4);

    /// Drives the machine at the nominal interval from `start` until `until` (inclusive)
    fn drive(
        machine: &mut BrakeStateMachine,
        engaged: bool,
        steering_ratio: f64,
        start: Instant,
        until: Duration,
        config: &DriveConfig,
    ) -> Instant {
        let mut now = start;
        while now <= start + until {
            machine.update(engaged, steering_ratio, now, 1.0, config);
            now += TICK;
        }
        now
    }

    #[test]
    fn test_first_press_jumps_to_floor() {
        let config = DriveConfig::default();
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();

        assert!((machine.update(true, 0.0, t0, 1.0, &config) - 0.4).abs() < 1e-12);
        assert!((machine.update(true, 0.0, t0 + TICK, 1.0, &config) - 0.8).abs() < 1e-12);
        assert_eq!(machine.update(true, 0.0, t0 + 2 * TICK, 1.0, &config), 1.0);
        assert!(matches!(machine.phase(), BrakePhase::Apply { .. }));
    }

    #[test]
    fn test_hold_then_eased_release() {
        let config = DriveConfig::default();
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();

        // Apply window covers ticks up to 1748 ms
        drive(&mut machine, true, 0.0, t0, Duration::from_millis(1748), &config);
        assert!(matches!(machine.phase(), BrakePhase::Apply { .. }));
        assert_eq!(machine.level(), 1.0);

        // First tick past the hold boundary anchors the release at the current level
        let release_start = t0 + Duration::from_millis(1752);
        assert_eq!(machine.update(true, 0.0, release_start, 1.0, &config), 1.0);
        match machine.phase() {
            BrakePhase::Release { anchor } => {
                assert_eq!(anchor.value, 1.0);
                assert_eq!(anchor.timer.started_at(), release_start);
            }
            other => panic!("expected Release, got {:?}", other),
        }

        // Halfway through the ease the level is strictly between anchor and floor
        let mid = machine.update(true, 0.0, release_start + Duration::from_millis(1250), 1.0, &config);
        let expected = 1.0 - 0.5f64.powf(1.7) * 0.6;
        assert!((mid - expected).abs() < 1e-9);

        // Fully eased out after the release duration
        let done = machine.update(true, 0.0, release_start + Duration::from_millis(2500), 1.0, &config);
        assert!((done - 0.4).abs() < 1e-9);
        let later = machine.update(true, 0.0, release_start + Duration::from_millis(4000), 1.0, &config);
        assert!((later - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_release_is_monotonic_while_pressed() {
        let config = DriveConfig::default();
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();
        let mut now = drive(&mut machine, true, 0.0, t0, Duration::from_millis(1752), &config);

        let mut previous = machine.level();
        while now <= t0 + Duration::from_millis(4400) {
            let level = machine.update(true, 0.0, now, 1.0, &config);
            assert!(level <= previous + 1e-12);
            previous = level;
            now += TICK;
        }
    }

    #[test]
    fn test_floor_holds_while_braking_with_trail() {
        let mut config = DriveConfig::default();
        config.brake.trail_enabled = true;
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();

        let mut now = t0;
        for step in 0..2000u32 {
            let ratio = f64::from(step % 100) / 100.0;
            let level = machine.update(true, ratio, now, 1.0, &config);
            assert!(level >= dynamic_minimum(ratio, &config.brake) - 1e-12);
            now += TICK;
        }
    }

    #[test]
    fn test_dynamic_minimum() {
        let mut brake = BrakeConfig::default();
        assert_eq!(dynamic_minimum(1.0, &brake), 0.40);

        brake.trail_enabled = true;
        assert_eq!(dynamic_minimum(0.0, &brake), 0.40);
        assert!((dynamic_minimum(1.0, &brake) - 0.55).abs() < 1e-12);
        assert!((dynamic_minimum(0.5, &brake) - (0.40 + 0.15 * 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_post_release_hysteresis() {
        let config = DriveConfig::default();
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();
        let now = drive(&mut machine, true, 0.0, t0, Duration::from_millis(100), &config);

        let released_at = now;
        let level = machine.update(false, 0.0, released_at, 1.0, &config);
        assert!(level >= config.brake.after_release_hold_ratio);
        assert!(matches!(machine.phase(), BrakePhase::PostReleaseHold { .. }));

        let mut now = released_at + TICK;
        while now < released_at + Duration::from_millis(500) {
            assert_eq!(machine.update(false, 0.0, now, 1.0, &config), 0.06);
            now += TICK;
        }

        // Hold over: decays via fast release
        let level = machine.update(false, 0.0, released_at + Duration::from_millis(500), 1.0, &config);
        assert!(matches!(machine.phase(), BrakePhase::Idle));
        assert!(level < 0.06);
        assert_eq!(level, 0.0);
    }

    #[test]
    fn test_idle_decays_to_zero() {
        let mut config = DriveConfig::default();
        config.brake.after_release_hold_ms = 0;
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();
        let now = drive(&mut machine, true, 0.0, t0, Duration::from_millis(40), &config);

        machine.update(false, 0.0, now, 1.0, &config);
        let mut previous = machine.level();
        let mut now = now + TICK;
        for _ in 0..50 {
            let level = machine.update(false, 0.0, now, 1.0, &config);
            assert!(level <= previous);
            previous = level;
            now += TICK;
        }
        assert_eq!(previous, 0.0);
        assert!(matches!(machine.phase(), BrakePhase::Idle));
    }

    #[test]
    fn test_quick_repress_restarts_apply_and_fresh_anchor() {
        let config = DriveConfig::default();
        let mut machine = BrakeStateMachine::new();
        let t0 = Instant::now();

        // Full cycle into Release, then let go
        let now = drive(&mut machine, true, 0.0, t0, Duration::from_millis(3000), &config);
        machine.update(false, 0.0, now, 1.0, &config);

        // Re-press inside the hysteresis window
        let repress = now + Duration::from_millis(100);
        machine.update(true, 0.0, repress, 1.0, &config);
        match machine.phase() {
            BrakePhase::Apply { pressed } => assert_eq!(pressed.started_at(), repress),
            other => panic!("expected Apply, got {:?}", other),
        }

        let end = drive(&mut machine, true, 0.0, repress + TICK, Duration::from_millis(1744), &config);
        let level_before = machine.level();
        machine.update(true, 0.0, end, 1.0, &config);
        match machine.phase() {
            BrakePhase::Release { anchor } => {
                assert_eq!(anchor.timer.started_at(), end);
                assert_eq!(anchor.value, level_before);
            }
            other => panic!("expected Release, got {:?}", other),
        }
    }

    #[test]
    fn test_output_is_always_bounded() {
        let mut config = DriveConfig::default();
        config.brake.after_release_hold_ratio = 1.0;
        config.brake.trail_enabled = true;
        config.brake.min_ratio_max = 1.0;
        let mut machine = BrakeStateMachine::new();
        let mut now = Instant::now();
        for step in 0..500u32 {
            let level = machine.update(step % 7 < 4, 1.0, now, 3.0, &config);
            assert!((0.0..=1.0).contains(&level));
            now += Duration::from_millis(u64::from(step % 13));
        }
    }
}
