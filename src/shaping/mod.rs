//! Input-shaping control loop
//!
//! Turns one tick's worth of aggregated mouse/keyboard state into the three
//! bounded channels fed to the virtual wheel:
//!
//! 1. [`timing`] - tick time-scale and phase timers
//! 2. [`steering`] - motion integration into a bounded steering position
//! 3. [`throttle`] - steering-dependent throttle cut with rate limiting
//! 4. [`brake`] - four-phase brake model
//!
//! # Data flow
//!
//! ```text
//! TickInput ──► Steering ──ratio──► Throttle ──► DriveFrame
//!                   │                              ▲
//!                   └──────ratio──► Brake ─────────┘
//! ```
//!
//! Everything here is plain arithmetic over fixed-size state. Nothing
//! allocates, blocks or fails.

pub mod brake;
pub mod steering;
pub mod throttle;
pub mod timing;

use crate::config::DriveConfig;
use brake::{BrakePhase, BrakeStateMachine};
use std::time::Instant;
use steering::SteeringIntegrator;
use throttle::ThrottleShaper;
use timing::TickClock;
use tracing::debug;

/// Aggregated input for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInput {
    /// Capped mouse motion accumulated since the previous tick
    pub motion_delta: i64,
    /// Middle button pressed since the previous tick
    pub center_reset: bool,
    pub accelerate: bool,
    pub brake: bool,
    pub gear_up: bool,
    pub gear_down: bool,
}

/// Channel values produced by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveFrame {
    /// Signed steering position in [-STEERING_RANGE, STEERING_RANGE]
    pub steering: f64,
    pub throttle: f64,
    pub brake: f64,
    pub gear_up: bool,
    pub gear_down: bool,
    pub time_scale: f64,
}

/// Control state plus the update operation that mutates it once per tick
#[derive(Debug, Clone)]
pub struct ShapingPipeline {
    config: DriveConfig,
    clock: TickClock,
    steering: SteeringIntegrator,
    throttle: ThrottleShaper,
    brake: BrakeStateMachine,
}

impl ShapingPipeline {
    /// All channels at rest, clock anchored at `now`
    pub fn new(config: DriveConfig, now: Instant) -> Self {
        let clock = TickClock::new(config.nominal_interval_ms(), now);
        Self {
            config,
            clock,
            steering: SteeringIntegrator::new(),
            throttle: ThrottleShaper::new(),
            brake: BrakeStateMachine::new(),
        }
    }

    pub fn update(&mut self, input: &TickInput, now: Instant) -> DriveFrame {
        let time_scale = self.clock.tick(now);

        if input.center_reset {
            self.steering.reset();
        } else {
            self.steering
                .integrate(input.motion_delta, self.config.steering.sensitivity);
        }
        let steering_ratio = self.steering.ratio();

        let throttle =
            self.throttle
                .shape(input.accelerate, steering_ratio, time_scale, &self.config);
        let brake = self
            .brake
            .update(input.brake, steering_ratio, now, time_scale, &self.config);

        let frame = DriveFrame {
            steering: self.steering.position(),
            throttle,
            brake,
            gear_up: input.gear_up,
            gear_down: input.gear_down,
            time_scale,
        };
        debug!(
            "Tick: scale={:.2} steer={:.0} thr={:.3} (target {:.3}) brk={:.3} {:?}",
            time_scale,
            frame.steering,
            frame.throttle,
            self.throttle.target(),
            frame.brake,
            self.brake.phase()
        );
        frame
    }

    pub fn steering_ratio(&self) -> f64 {
        self.steering.ratio()
    }

    pub fn brake_phase(&self) -> &BrakePhase {
        self.brake.phase()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }
}
