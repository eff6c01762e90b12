//! Raw mouse/keyboard input and its per-tick aggregation
//!
//! ```text
//! Mouse ──► EventCollector ──[RawInputEvent]──► InputAggregator ──► TickInput
//!           (own thread)      (mpsc, 1000)      (tick task)
//! Keyboard ──► KeyLevelSource ──(sampled once per tick)──┘
//! ```
//!
//! The collector only forwards events. Clamping, accumulation and button
//! level tracking all happen in [`InputAggregator`] on the tick task, so
//! the shaping state has a single owner and needs no locking.

pub mod event_collector;
pub mod keys;

pub use event_collector::{CollectorError, CollectorHandle, EventCollector};
pub use keys::{EvdevKeys, NoKeys};

use crate::shaping::TickInput;
use chrono::{DateTime, Local};
use tracing::{debug, info};

/// Raw input event with wall-clock timestamp
#[derive(Debug, Clone)]
pub enum RawInputEvent {
    Motion {
        dx: i32,
        timestamp: DateTime<Local>,
    },
    Button {
        button: MouseButton,
        state: ButtonState,
        timestamp: DateTime<Local>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Accelerator
    Left,
    /// Brake
    Right,
    /// Recenters steering
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Level state of the two gear keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GearKeys {
    pub up: bool,
    pub down: bool,
}

/// Keyboard state queried once per tick
pub trait KeyLevelSource: Send {
    fn sample(&mut self) -> GearKeys;
}

/// Accumulates raw events between ticks
#[derive(Debug, Clone, Default)]
pub struct InputAggregator {
    delta_cap: i32,
    pending_delta: i64,
    center_reset: bool,
    accelerate: bool,
    brake: bool,
}

impl InputAggregator {
    pub fn new(delta_cap: i32) -> Self {
        Self {
            delta_cap: delta_cap.max(0),
            ..Default::default()
        }
    }

    pub fn apply(&mut self, event: &RawInputEvent) {
        match event {
            RawInputEvent::Motion { dx, .. } => {
                let capped = (*dx).clamp(-self.delta_cap, self.delta_cap);
                self.pending_delta = self.pending_delta.saturating_add(i64::from(capped));
            }
            RawInputEvent::Button {
                button,
                state,
                timestamp,
            } => {
                info!(
                    "Button event: {:?} {:?} at {}",
                    button,
                    state,
                    timestamp.format("%H:%M:%S.%3f")
                );
                let pressed = *state == ButtonState::Pressed;
                match button {
                    MouseButton::Left => self.accelerate = pressed,
                    MouseButton::Right => self.brake = pressed,
                    MouseButton::Middle => {
                        if pressed {
                            debug!("Center reset, dropping {} pending counts", self.pending_delta);
                            self.center_reset = true;
                            self.pending_delta = 0;
                        }
                    }
                }
            }
        }
    }

    /// Hands the accumulated state to the tick and clears the one-shot parts
    pub fn take_tick_input(&mut self, keys: GearKeys) -> TickInput {
        let input = TickInput {
            motion_delta: self.pending_delta,
            center_reset: self.center_reset,
            accelerate: self.accelerate,
            brake: self.brake,
            gear_up: keys.up,
            gear_down: keys.down,
        };
        self.pending_delta = 0;
        self.center_reset = false;
        input
    }

    /// Drops held buttons, e.g. after the mouse went away
    pub fn release_all(&mut self) {
        self.accelerate = false;
        self.brake = false;
        self.pending_delta = 0;
    }

    pub fn pending_delta(&self) -> i64 {
        self.pending_delta
    }
}
