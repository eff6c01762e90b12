//! Fixed-rate tick driver
//!
//! Runs the whole pipeline once per tick on a single task:
//!
//! ```text
//! Waiting ──collect──► Shaping ──shape──► Publishing ──publish──► Waiting
//! (drain queue,        (run shapers)      (map + write sink,
//!  sample keys)                            broadcast frame)
//! ```
//!
//! [`driver_handle`] spawns the loop and owns its lifecycle.

pub mod driver_handle;
pub mod tick_driver;

pub use driver_handle::DriverHandle;
pub use tick_driver::{TickBatch, TickDriver, TickState};

use crate::output::OutputError;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Output error: {0}")]
    OutputError(#[from] OutputError),

    #[error("Driver task failed: {0}")]
    TaskError(String),
}
