//! Virtual wheel device using evdev/uinput
//!
//! Appears to games as a joystick with a steering axis, two pedal axes and
//! two gear buttons.

use super::{
    AxisId, DeviceId, MappedOutput, OutputError, OutputSink, AXIS_MAX, AXIS_MIN, GEAR_DOWN_BUTTON,
    GEAR_UP_BUTTON,
};
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, UinputAbsSetup,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Virtual wheel device
pub struct VirtualJoystick {
    id: DeviceId,
    device: VirtualDevice,
    /// Last emitted axis values (for change detection)
    axis_values: HashMap<AxisId, i32>,
    /// Last emitted button states
    button_states: HashMap<u8, bool>,
}

impl VirtualJoystick {
    /// Create the device and put it in the neutral position
    ///
    /// # Arguments
    /// * `id` - Identifier output calls must address
    /// * `name` - Device name shown in `evtest` and game controller settings
    pub fn create(id: DeviceId, name: &str) -> Result<Self, OutputError> {
        let mut builder = VirtualDeviceBuilder::new()
            .map_err(OutputError::CreateDevice)?
            .name(name);

        let mut keys = AttributeSet::<Key>::new();
        keys.insert(button_key(GEAR_UP_BUTTON).ok_or(OutputError::UnknownButton(GEAR_UP_BUTTON))?);
        keys.insert(
            button_key(GEAR_DOWN_BUTTON).ok_or(OutputError::UnknownButton(GEAR_DOWN_BUTTON))?,
        );
        builder = builder
            .with_keys(&keys)
            .map_err(OutputError::CreateDevice)?;

        for axis in [AxisId::X, AxisId::Y, AxisId::RZ] {
            let abs_setup =
                UinputAbsSetup::new(axis_code(axis), AbsInfo::new(0, AXIS_MIN, AXIS_MAX, 0, 0, 1));
            builder = builder
                .with_absolute_axis(&abs_setup)
                .map_err(OutputError::CreateDevice)?;
        }

        let device = builder.build().map_err(OutputError::CreateDevice)?;
        info!("Created virtual joystick {} \"{}\"", id, name);

        let mut joystick = Self {
            id,
            device,
            axis_values: HashMap::new(),
            button_states: HashMap::new(),
        };
        joystick.reset()?;
        Ok(joystick)
    }

    /// Centers the wheel and releases pedals and buttons
    pub fn reset(&mut self) -> Result<(), OutputError> {
        debug!("Resetting virtual joystick {}", self.id);
        // Forget cached values so every event is emitted
        self.axis_values.clear();
        self.button_states.clear();
        let id = self.id;
        MappedOutput::neutral().send(self, id)
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Get the device path (e.g., /dev/input/eventX)
    pub fn device_path(&mut self) -> Option<std::path::PathBuf> {
        self.device
            .enumerate_dev_nodes_blocking()
            .ok()?
            .next()?
            .ok()
    }

    fn check_device(&self, device: DeviceId) -> Result<(), OutputError> {
        if device != self.id {
            return Err(OutputError::UnknownDevice(device));
        }
        Ok(())
    }
}

impl OutputSink for VirtualJoystick {
    /// Only emits events if the value has changed
    fn set_axis(&mut self, device: DeviceId, axis: AxisId, value: i32) -> Result<(), OutputError> {
        self.check_device(device)?;
        let clamped = value.clamp(AXIS_MIN, AXIS_MAX);

        if self.axis_values.get(&axis) == Some(&clamped) {
            return Ok(());
        }
        self.axis_values.insert(axis, clamped);

        let event = InputEvent::new(EventType::ABSOLUTE, axis_code(axis).0, clamped);
        self.device
            .emit(&[event])
            .map_err(OutputError::EmitEvent)
    }

    fn set_button(
        &mut self,
        device: DeviceId,
        button: u8,
        pressed: bool,
    ) -> Result<(), OutputError> {
        self.check_device(device)?;
        let key = button_key(button).ok_or(OutputError::UnknownButton(button))?;

        if self.button_states.get(&button) == Some(&pressed) {
            return Ok(());
        }
        self.button_states.insert(button, pressed);

        let event = InputEvent::new(EventType::KEY, key.code(), i32::from(pressed));
        self.device
            .emit(&[event])
            .map_err(OutputError::EmitEvent)
    }
}

impl Drop for VirtualJoystick {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            warn!("Failed to release virtual joystick {}: {}", self.id, e);
        }
    }
}

fn axis_code(axis: AxisId) -> AbsoluteAxisType {
    match axis {
        AxisId::X => AbsoluteAxisType::ABS_X,
        AxisId::Y => AbsoluteAxisType::ABS_Y,
        AxisId::RZ => AbsoluteAxisType::ABS_RZ,
    }
}

// 1-based button indices onto the joystick button range
fn button_key(button: u8) -> Option<Key> {
    match button {
        1 => Some(Key::BTN_TRIGGER),
        2 => Some(Key::BTN_THUMB),
        _ => None,
    }
}
