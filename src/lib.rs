//! Mouse-to-wheel input shaping
//!
//! Reads a mouse (and two keyboard keys), shapes the input into steering,
//! throttle and brake channels once per tick, and drives a virtual joystick.
//!
//! ```text
//! input ──[RawInputEvent]──► driver ──TickInput──► shaping ──DriveFrame──► output
//! ```

pub mod config;
pub mod driver;
pub mod input;
pub mod output;
pub mod shaping;
