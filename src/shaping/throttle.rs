//! Steering-dependent throttle target with asymmetric rate limiting
//!
//! Throttle is cut only as steering approaches full lock. Below
//! [`CUT_START_RATIO`] the target is full throttle, above [`CUT_FULL_RATIO`]
//! it sits at the configured floor, and in between the normalized cut is
//! raised to `curve_exponent`. The level then follows the target with a hard
//! per-tick ceiling, optionally followed by an exponential moving average.

use crate::config::{DriveConfig, ThrottleConfig};

/// Steering ratio where the throttle cut begins
pub const CUT_START_RATIO: f64 = 0.19;
/// Steering ratio where the throttle cut reaches its floor
pub const CUT_FULL_RATIO: f64 = 0.80;

#[derive(Debug, Clone, Default)]
pub struct ThrottleShaper {
    level: f64,
    target: f64,
}

impl ThrottleShaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the level toward the target for this tick and returns it
    pub fn shape(
        &mut self,
        accelerate_engaged: bool,
        steering_ratio: f64,
        time_scale: f64,
        config: &DriveConfig,
    ) -> f64 {
        let throttle = &config.throttle;
        self.target = target_throttle(accelerate_engaged, steering_ratio, throttle);

        let max_increase = config.rate_from_time(1.0, throttle.ramp_ms) * time_scale;
        let max_decrease = config.rate_from_time(1.0, throttle.drop_ms) * time_scale;
        let delta = self.target - self.level;

        let step = if delta > 0.0 {
            delta.min(max_increase)
        } else {
            delta.max(-max_decrease)
        };

        let mut candidate = self.level + step;
        if throttle.use_smoothing {
            candidate += throttle.smoothing_alpha * (self.target - candidate);
        }

        self.level = candidate.clamp(0.0, 1.0);
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

/// Throttle target for the given accelerator state and steering ratio
pub fn target_throttle(engaged: bool, steering_ratio: f64, config: &ThrottleConfig) -> f64 {
    if !engaged {
        return 0.0;
    }

    let normalized = if steering_ratio <= CUT_START_RATIO {
        0.0
    } else if steering_ratio >= CUT_FULL_RATIO {
        1.0
    } else {
        (steering_ratio - CUT_START_RATIO) / (CUT_FULL_RATIO - CUT_START_RATIO)
    };

    let shaped = normalized.clamp(0.0, 1.0).powf(config.curve_exponent);
    (1.0 - shaped * (1.0 - config.min_cut_at_full_lock)).clamp(0.0, 1.0)
}
