//! Driver Handle - spawns the tick loop and owns its lifecycle
//!
//! ```text
//! CollectorHandle ─[RawInputEvent]→ DriverHandle ─[set_axis/set_button]→ VirtualJoystick
//!                 (mpsc::channel(1000))   │
//!                                         └─[DriveFrame]→ watch subscribers
//! ```

use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::tick_driver::{run_tick_loop, TickDriver};
use super::DriverError;
use crate::config::DriveConfig;
use crate::input::{KeyLevelSource, RawInputEvent};
use crate::output::{DeviceId, OutputSink};
use crate::shaping::DriveFrame;

/// Handle to a running tick loop
///
/// Dropping the handle does not stop the loop; cancel the token passed to
/// [`DriverHandle::spawn`] and then [`join`](DriverHandle::join).
pub struct DriverHandle {
    frame_receiver: watch::Receiver<DriveFrame>,
    task: JoinHandle<Result<(), DriverError>>,
}

impl DriverHandle {
    /// Create a driver and spawn it as a tokio task
    pub fn spawn(
        config: DriveConfig,
        event_receiver: mpsc::Receiver<RawInputEvent>,
        keys: Box<dyn KeyLevelSource>,
        sink: Box<dyn OutputSink>,
        device: DeviceId,
        cancel: CancellationToken,
    ) -> Self {
        info!("Spawning tick driver for device {}", device);

        let driver = TickDriver::create(config, event_receiver, keys, sink, device, Instant::now());
        let frame_receiver = driver.subscribe();
        debug!("Created frame receiver for observers");

        let task = tokio::spawn(async move {
            info!("Tick driver task started");
            let result = run_tick_loop(driver, cancel).await;
            match &result {
                Ok(()) => info!("Tick driver task finished"),
                Err(e) => error!("Tick driver terminated with error: {}", e),
            }
            result
        });

        Self {
            frame_receiver,
            task,
        }
    }

    /// Get a receiver for the latest shaped frame
    pub fn subscribe(&self) -> watch::Receiver<DriveFrame> {
        self.frame_receiver.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit
    pub async fn join(self) -> Result<(), DriverError> {
        self.task
            .await
            .map_err(|e| DriverError::TaskError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NoKeys;
    use crate::output::RecordingSink;
    use chrono::Local;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_and_join() {
        let (tx, rx) = mpsc::channel(1000);
        let cancel = CancellationToken::new();
        let handle = DriverHandle::spawn(
            DriveConfig::default(),
            rx,
            Box::new(NoKeys),
            Box::new(RecordingSink::default()),
            DeviceId(1),
            cancel.clone(),
        );
        let mut frames = handle.subscribe();

        tx.send(RawInputEvent::Motion {
            dx: -50,
            timestamp: Local::now(),
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                frames.changed().await.unwrap();
                if frames.borrow().steering != 0.0 {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(frames.borrow().steering, -150.0);
        assert!(!handle.is_finished());

        cancel.cancel();
        assert!(handle.join().await.is_ok());
    }
}
