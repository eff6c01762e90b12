//! Startup configuration for the shaping pipeline and its devices.
//!
//! All tunables are read once at process start and stay immutable afterwards.
//! A missing file degrades to defaults so the converter always starts with the
//! reference tuning; a malformed file is a startup error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "MOUSEDRIVE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete converter configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    pub tick: TickConfig,
    pub steering: SteeringConfig,
    pub throttle: ThrottleConfig,
    pub brake: BrakeConfig,
    pub device: DeviceConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TickConfig {
    /// Nominal tick interval in milliseconds
    pub interval_ms: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { interval_ms: 4 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    /// Steering units per mouse count
    pub sensitivity: f64,
    /// Largest motion accepted from a single raw event, in mouse counts
    pub delta_cap: i32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            sensitivity: 3.0,
            delta_cap: 180,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Exponent applied to the normalized steering cut
    pub curve_exponent: f64,
    /// Throttle fraction left at full steering lock
    pub min_cut_at_full_lock: f64,
    /// Time for a full 0 -> 1 ramp
    pub ramp_ms: u32,
    /// Time for a full 1 -> 0 drop
    pub drop_ms: u32,
    pub use_smoothing: bool,
    /// Weight of the moving average pulling toward target
    pub smoothing_alpha: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            curve_exponent: 2.0,
            min_cut_at_full_lock: 0.70,
            ramp_ms: 75,
            drop_ms: 25,
            use_smoothing: true,
            smoothing_alpha: 0.30,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrakeConfig {
    pub fast_apply_ms: u32,
    /// Duration of the apply phase while the button stays pressed
    pub hold_ms: u32,
    /// Duration of the eased release down to the dynamic minimum
    pub release_total_ms: u32,
    pub release_accel_exponent: f64,
    pub fast_release_ms: u32,
    pub min_ratio_base: f64,
    pub min_ratio_max: f64,
    /// Exponent applied to the steering ratio when trail braking
    pub curve_exponent: f64,
    pub trail_enabled: bool,
    /// Level held right after the button is released
    pub after_release_hold_ratio: f64,
    pub after_release_hold_ms: u32,
}

impl Default for BrakeConfig {
    fn default() -> Self {
        Self {
            fast_apply_ms: 10,
            hold_ms: 1750,
            release_total_ms: 2500,
            release_accel_exponent: 1.7,
            fast_release_ms: 65,
            min_ratio_base: 0.40,
            min_ratio_max: 0.55,
            curve_exponent: 2.0,
            trail_enabled: false,
            after_release_hold_ratio: 0.06,
            after_release_hold_ms: 500,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Virtual joystick id passed to every output call
    pub id: u32,
    /// Name of the virtual joystick as shown to games
    pub name: String,
    /// Mouse event node; discovered automatically when unset
    pub mouse_path: Option<PathBuf>,
    /// Keyboard event node; discovered automatically when unset
    pub keyboard_path: Option<PathBuf>,
    pub gear_up_key: String,
    pub gear_down_key: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "MouseDrive Virtual Wheel".to_string(),
            mouse_path: None,
            keyboard_path: None,
            gear_up_key: "W".to_string(),
            gear_down_key: "S".to_string(),
        }
    }
}

impl DriveConfig {
    /// Default location: `$MOUSEDRIVE_CONFIG`, else `~/.config/mousedrive/config.toml`
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mousedrive")
            .join("config.toml")
    }

    /// Load from a TOML file, falling back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Rejects values the shaping math cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("steering.sensitivity", self.steering.sensitivity)?;
        if self.steering.delta_cap < 0 {
            return Err(ConfigError::Invalid {
                field: "steering.delta_cap",
                reason: format!("must not be negative, got {}", self.steering.delta_cap),
            });
        }

        check_positive("throttle.curve_exponent", self.throttle.curve_exponent)?;
        check_ratio(
            "throttle.min_cut_at_full_lock",
            self.throttle.min_cut_at_full_lock,
        )?;
        check_ratio("throttle.smoothing_alpha", self.throttle.smoothing_alpha)?;

        check_positive(
            "brake.release_accel_exponent",
            self.brake.release_accel_exponent,
        )?;
        check_positive("brake.curve_exponent", self.brake.curve_exponent)?;
        check_ratio("brake.min_ratio_base", self.brake.min_ratio_base)?;
        check_ratio("brake.min_ratio_max", self.brake.min_ratio_max)?;
        check_ratio(
            "brake.after_release_hold_ratio",
            self.brake.after_release_hold_ratio,
        )?;
        if self.brake.min_ratio_max < self.brake.min_ratio_base {
            return Err(ConfigError::Invalid {
                field: "brake.min_ratio_max",
                reason: format!(
                    "{} is below min_ratio_base {}",
                    self.brake.min_ratio_max, self.brake.min_ratio_base
                ),
            });
        }

        Ok(())
    }

    /// Nominal tick interval, never below 1 ms
    pub fn nominal_interval_ms(&self) -> f64 {
        f64::from(self.tick.interval_ms.max(1))
    }

    /// Per-tick step that covers `full_scale` in `milliseconds` at the nominal rate
    pub fn rate_from_time(&self, full_scale: f64, milliseconds: u32) -> f64 {
        if milliseconds == 0 {
            return full_scale;
        }
        full_scale * (self.nominal_interval_ms() / f64::from(milliseconds))
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("expected a ratio in [0, 1], got {}", value),
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("expected a positive finite number, got {}", value),
        });
    }
    Ok(())
}
