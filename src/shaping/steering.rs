//! Integrates relative mouse motion into a bounded steering position

/// Full steering lock magnitude, in output units either side of center
pub const STEERING_RANGE: f64 = 16383.0;

#[derive(Debug, Clone, Default)]
pub struct SteeringIntegrator {
    position: f64,
}

impl SteeringIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `motion_delta * sensitivity` and clamps to the steering range
    pub fn integrate(&mut self, motion_delta: i64, sensitivity: f64) -> f64 {
        self.position += motion_delta as f64 * sensitivity;
        self.position = self.position.clamp(-STEERING_RANGE, STEERING_RANGE);
        self.position
    }

    /// Recenters to exactly zero
    pub fn reset(&mut self) {
        self.position = 0.0;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Absolute position relative to full lock, in [0, 1]
    pub fn ratio(&self) -> f64 {
        (self.position.abs() / STEERING_RANGE).clamp(0.0, 1.0)
    }
}
