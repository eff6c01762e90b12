//! Gear key sampling

use super::event_collector::CollectorError;
use super::{GearKeys, KeyLevelSource};
use evdev::{Device, Key};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Queries the kernel key state of a keyboard node once per tick
pub struct EvdevKeys {
    device: Device,
    gear_up: Key,
    gear_down: Key,
    failed: bool,
}

impl EvdevKeys {
    pub fn open(path: &Path, gear_up: Key, gear_down: Key) -> Result<Self, CollectorError> {
        let device = Device::open(path).map_err(|source| CollectorError::OpenDevice {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Sampling gear keys {:?}/{:?} from {:?} ({})",
            gear_up,
            gear_down,
            path,
            device.name().unwrap_or("unnamed")
        );
        Ok(Self {
            device,
            gear_up,
            gear_down,
            failed: false,
        })
    }
}

impl KeyLevelSource for EvdevKeys {
    fn sample(&mut self) -> GearKeys {
        match self.device.get_key_state() {
            Ok(state) => {
                self.failed = false;
                GearKeys {
                    up: state.contains(self.gear_up),
                    down: state.contains(self.gear_down),
                }
            }
            Err(e) => {
                if !self.failed {
                    warn!("Keyboard state unavailable, gears released: {}", e);
                    self.failed = true;
                }
                GearKeys::default()
            }
        }
    }
}

/// Stand-in when no keyboard is available; gears stay released
#[derive(Debug, Default)]
pub struct NoKeys;

impl KeyLevelSource for NoKeys {
    fn sample(&mut self) -> GearKeys {
        GearKeys::default()
    }
}

/// First device that can report both gear keys
pub fn discover_keyboard(gear_up: Key, gear_down: Key) -> Result<PathBuf, CollectorError> {
    for (path, device) in evdev::enumerate() {
        let has_keys = device
            .supported_keys()
            .map_or(false, |keys| keys.contains(gear_up) && keys.contains(gear_down));
        if has_keys {
            info!(
                "Discovered keyboard {:?} ({})",
                path,
                device.name().unwrap_or("unnamed")
            );
            return Ok(path);
        }
    }
    Err(CollectorError::NoDevice(format!(
        "no keyboard with {:?} and {:?}",
        gear_up, gear_down
    )))
}

/// Resolves a configured key name such as `"W"`, `"key_w"` or `"Space"`
pub fn key_from_name(name: &str) -> Option<Key> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("KEY_").unwrap_or(&upper);

    let key = match bare {
        "A" => Key::KEY_A,
        "B" => Key::KEY_B,
        "C" => Key::KEY_C,
        "D" => Key::KEY_D,
        "E" => Key::KEY_E,
        "F" => Key::KEY_F,
        "G" => Key::KEY_G,
        "H" => Key::KEY_H,
        "I" => Key::KEY_I,
        "J" => Key::KEY_J,
        "K" => Key::KEY_K,
        "L" => Key::KEY_L,
        "M" => Key::KEY_M,
        "N" => Key::KEY_N,
        "O" => Key::KEY_O,
        "P" => Key::KEY_P,
        "Q" => Key::KEY_Q,
        "R" => Key::KEY_R,
        "S" => Key::KEY_S,
        "T" => Key::KEY_T,
        "U" => Key::KEY_U,
        "V" => Key::KEY_V,
        "W" => Key::KEY_W,
        "X" => Key::KEY_X,
        "Y" => Key::KEY_Y,
        "Z" => Key::KEY_Z,
        "0" => Key::KEY_0,
        "1" => Key::KEY_1,
        "2" => Key::KEY_2,
        "3" => Key::KEY_3,
        "4" => Key::KEY_4,
        "5" => Key::KEY_5,
        "6" => Key::KEY_6,
        "7" => Key::KEY_7,
        "8" => Key::KEY_8,
        "9" => Key::KEY_9,
        "SPACE" => Key::KEY_SPACE,
        "TAB" => Key::KEY_TAB,
        "LEFTSHIFT" | "SHIFT" => Key::KEY_LEFTSHIFT,
        "LEFTCTRL" | "CTRL" => Key::KEY_LEFTCTRL,
        "LEFTALT" | "ALT" => Key::KEY_LEFTALT,
        "UP" => Key::KEY_UP,
        "DOWN" => Key::KEY_DOWN,
        "LEFT" => Key::KEY_LEFT,
        "RIGHT" => Key::KEY_RIGHT,
        _ => return None,
    };
    Some(key)
}
