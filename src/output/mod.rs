//! Mapping of shaped channels onto a virtual joystick
//!
//! [`AxisMapper`] is a pure, saturating linear transform from a
//! [`DriveFrame`] to native device units. [`OutputSink`] is the seam to the
//! device itself; [`VirtualJoystick`] implements it on top of uinput.

pub mod virtual_joystick;

pub use virtual_joystick::VirtualJoystick;

use crate::shaping::steering::STEERING_RANGE;
use crate::shaping::DriveFrame;
use std::fmt;

/// Lowest native axis value
pub const AXIS_MIN: i32 = 0;
/// Highest native axis value
pub const AXIS_MAX: i32 = 32767;
/// Native value of a centered steering axis
pub const AXIS_CENTER: i32 = 16383;

/// Button index reporting the gear-up key
pub const GEAR_UP_BUTTON: u8 = 1;
/// Button index reporting the gear-down key
pub const GEAR_DOWN_BUTTON: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to create virtual device: {0}")]
    CreateDevice(#[source] std::io::Error),

    #[error("Failed to emit event: {0}")]
    EmitEvent(#[source] std::io::Error),

    #[error("Unknown output device {0}")]
    UnknownDevice(DeviceId),

    #[error("Unsupported button index {0}")]
    UnknownButton(u8),
}

/// Identifier of the virtual device an output call addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Output axes used by the wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    /// Steering
    X,
    /// Throttle
    Y,
    /// Brake
    RZ,
}

/// Virtual joystick collaborator
pub trait OutputSink: Send {
    fn set_axis(&mut self, device: DeviceId, axis: AxisId, value: i32) -> Result<(), OutputError>;

    fn set_button(&mut self, device: DeviceId, button: u8, pressed: bool)
        -> Result<(), OutputError>;
}

/// One tick's worth of native output values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedOutput {
    pub steering: i32,
    pub throttle: i32,
    pub brake: i32,
    pub gear_up: bool,
    pub gear_down: bool,
}

impl MappedOutput {
    /// Centered wheel, pedals up, buttons released
    pub fn neutral() -> Self {
        Self {
            steering: AXIS_CENTER,
            throttle: AXIS_MIN,
            brake: AXIS_MIN,
            gear_up: false,
            gear_down: false,
        }
    }

    /// Issues the three axis calls and two button calls
    pub fn send(&self, sink: &mut dyn OutputSink, device: DeviceId) -> Result<(), OutputError> {
        sink.set_axis(device, AxisId::X, self.steering)?;
        sink.set_axis(device, AxisId::Y, self.throttle)?;
        sink.set_axis(device, AxisId::RZ, self.brake)?;
        sink.set_button(device, GEAR_UP_BUTTON, self.gear_up)?;
        sink.set_button(device, GEAR_DOWN_BUTTON, self.gear_down)?;
        Ok(())
    }
}

pub struct AxisMapper;

impl AxisMapper {
    pub fn map(frame: &DriveFrame) -> MappedOutput {
        MappedOutput {
            steering: map_steering(frame.steering),
            throttle: map_unipolar(frame.throttle),
            brake: map_unipolar(frame.brake),
            gear_up: frame.gear_up,
            gear_down: frame.gear_down,
        }
    }
}

fn map_steering(position: f64) -> i32 {
    let safe = position.clamp(-STEERING_RANGE, STEERING_RANGE);
    (AXIS_CENTER + safe.round() as i32).clamp(AXIS_MIN, AXIS_MAX)
}

fn map_unipolar(value: f64) -> i32 {
    (value.clamp(0.0, 1.0) * f64::from(AXIS_MAX)).round() as i32
}

/// Sink that records every call, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub axes: Vec<(DeviceId, AxisId, i32)>,
    pub buttons: Vec<(DeviceId, u8, bool)>,
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn set_axis(&mut self, device: DeviceId, axis: AxisId, value: i32) -> Result<(), OutputError> {
        self.axes.push((device, axis, value));
        Ok(())
    }

    fn set_button(
        &mut self,
        device: DeviceId,
        button: u8,
        pressed: bool,
    ) -> Result<(), OutputError> {
        self.buttons.push((device, button, pressed));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(steering: f64, throttle: f64, brake: f64) -> DriveFrame {
        DriveFrame {
            steering,
            throttle,
            brake,
            ..Default::default()
        }
    }

    #[test]
    fn test_rest_frame_maps_to_neutral() {
        assert_eq!(AxisMapper::map(&DriveFrame::default()), MappedOutput::neutral());
    }

    #[test]
    fn test_steering_is_centered_and_saturates() {
        assert_eq!(AxisMapper::map(&frame(STEERING_RANGE, 0.0, 0.0)).steering, 32766);
        assert_eq!(AxisMapper::map(&frame(-STEERING_RANGE, 0.0, 0.0)).steering, 0);
        assert_eq!(AxisMapper::map(&frame(1e9, 0.0, 0.0)).steering, 32766);
        assert_eq!(AxisMapper::map(&frame(100.4, 0.0, 0.0)).steering, 16483);
        assert_eq!(AxisMapper::map(&frame(-100.6, 0.0, 0.0)).steering, 16282);
    }

    #[test]
    fn test_pedals_scale_to_full_range() {
        let mapped = AxisMapper::map(&frame(0.0, 1.0, 0.5));
        assert_eq!(mapped.throttle, AXIS_MAX);
        assert_eq!(mapped.brake, 16384);

        let mapped = AxisMapper::map(&frame(0.0, 2.0, -1.0));
        assert_eq!(mapped.throttle, AXIS_MAX);
        assert_eq!(mapped.brake, AXIS_MIN);
    }

    #[test]
    fn test_send_issues_five_calls() {
        let mut sink = RecordingSink::default();
        let mapped = MappedOutput {
            steering: 100,
            throttle: 200,
            brake: 300,
            gear_up: true,
            gear_down: false,
        };
        mapped.send(&mut sink, DeviceId(1)).unwrap();

        assert_eq!(
            sink.axes,
            vec![
                (DeviceId(1), AxisId::X, 100),
                (DeviceId(1), AxisId::Y, 200),
                (DeviceId(1), AxisId::RZ, 300),
            ]
        );
        assert_eq!(
            sink.buttons,
            vec![
                (DeviceId(1), GEAR_UP_BUTTON, true),
                (DeviceId(1), GEAR_DOWN_BUTTON, false),
            ]
        );
    }
}
