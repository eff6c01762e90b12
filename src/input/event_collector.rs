use chrono::Local;
use evdev::{Device, InputEvent, InputEventKind, Key, RelativeAxisType};
use statum::{machine, state};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ButtonState, MouseButton, RawInputEvent};

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to open input device {path}: {source}")]
    OpenDevice {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Device {0} does not report relative X motion")]
    NotAMouse(String),

    #[error("No input device found: {0}")]
    NoDevice(String),

    #[error("Failed to read events: {0}")]
    EventCollectionError(#[source] std::io::Error),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("Failed to start collector thread: {0}")]
    ThreadError(#[source] std::io::Error),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    // Mouse event node
    device: Device,

    // Path the device was opened from
    path: PathBuf,

    // Channel to the tick driver
    event_sender: mpsc::Sender<RawInputEvent>,

    // Events forwarded since the last stats line
    forwarded: u64,
}

impl<S: CollectionState> EventCollector<S> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create(
        path: &Path,
        event_sender: mpsc::Sender<RawInputEvent>,
    ) -> Result<Self, CollectorError> {
        debug!("Opening mouse device {:?}", path);
        let device = Device::open(path).map_err(|source| CollectorError::OpenDevice {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::new(device, path.to_path_buf(), event_sender, 0))
    }

    // Check capabilities and transition to Collecting state
    pub fn initialize(self) -> Result<EventCollector<Collecting>, CollectorError> {
        let name = self.device.name().unwrap_or("unnamed").to_string();

        let has_rel_x = self
            .device
            .supported_relative_axes()
            .map_or(false, |axes| axes.contains(RelativeAxisType::REL_X));
        if !has_rel_x {
            error!("Device {:?} ({}) has no REL_X axis", self.path, name);
            return Err(CollectorError::NotAMouse(name));
        }

        let has_buttons = self.device.supported_keys().map_or(false, |keys| {
            keys.contains(Key::BTN_LEFT) && keys.contains(Key::BTN_RIGHT)
        });
        if !has_buttons {
            warn!("Device {} reports no left/right buttons, pedals will stay idle", name);
        }

        info!("Collecting mouse input from {:?} ({})", self.path, name);
        Ok(self.transition())
    }
}

// Implementation for Collecting state
impl EventCollector<Collecting> {
    // Blocks until the next batch of kernel events and forwards it
    pub fn collect_next_batch(&mut self) -> Result<(), CollectorError> {
        let events: Vec<RawInputEvent> = self
            .device
            .fetch_events()
            .map_err(CollectorError::EventCollectionError)?
            .filter_map(convert_event)
            .collect();

        for raw_event in events {
            match self.event_sender.try_send(raw_event) {
                Ok(_) => self.forwarded += 1,
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!("Input queue full, dropping {:?}", event);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(CollectorError::EventSendError(
                        "tick driver stopped".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    // Run the collector until the device or the channel goes away
    pub fn run_collection_loop(&mut self) -> Result<(), CollectorError> {
        info!("Starting Event Collector loop");

        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(30);

        loop {
            if self.event_sender.is_closed() {
                info!("Tick driver gone, stopping collector");
                return Ok(());
            }

            self.collect_next_batch()?;

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Event Collector stats: forwarded {} events in last {} seconds",
                    self.forwarded,
                    log_interval.num_seconds()
                );
                self.forwarded = 0;
                last_log_time = now;
            }
        }
    }
}

/// Owns the collector thread
pub struct CollectorHandle {
    thread: JoinHandle<()>,
}

impl CollectorHandle {
    /// Opens the device on the caller's thread, then reads it on a dedicated one
    ///
    /// Opening errors are returned here so startup can abort; errors while
    /// reading end the thread and close the channel.
    pub fn spawn(
        path: &Path,
        event_sender: mpsc::Sender<RawInputEvent>,
    ) -> Result<Self, CollectorError> {
        let collector = EventCollector::create(path, event_sender)?;
        let mut collecting = collector.initialize()?;

        let thread = std::thread::Builder::new()
            .name("input-collector".to_string())
            .spawn(move || {
                if let Err(e) = collecting.run_collection_loop() {
                    error!("Collector for {:?} terminated: {}", collecting.path(), e);
                }
            })
            .map_err(CollectorError::ThreadError)?;

        info!("Event Collector successfully started");
        Ok(Self { thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// First mouse-like device: relative X motion plus a left button
pub fn discover_mouse() -> Result<PathBuf, CollectorError> {
    for (path, device) in evdev::enumerate() {
        let has_rel_x = device
            .supported_relative_axes()
            .map_or(false, |axes| axes.contains(RelativeAxisType::REL_X));
        let has_left = device
            .supported_keys()
            .map_or(false, |keys| keys.contains(Key::BTN_LEFT));
        if has_rel_x && has_left {
            info!(
                "Discovered mouse {:?} ({})",
                path,
                device.name().unwrap_or("unnamed")
            );
            return Ok(path);
        }
    }
    Err(CollectorError::NoDevice(
        "no device with relative X motion and a left button".to_string(),
    ))
}

// Map an evdev event to our raw event type; everything else is dropped
fn convert_event(event: InputEvent) -> Option<RawInputEvent> {
    let timestamp = Local::now();
    match event.kind() {
        InputEventKind::RelAxis(RelativeAxisType::REL_X) => Some(RawInputEvent::Motion {
            dx: event.value(),
            timestamp,
        }),
        InputEventKind::Key(key) => {
            let button = map_button(key)?;
            let state = match event.value() {
                0 => ButtonState::Released,
                1 => ButtonState::Pressed,
                // Autorepeat carries no new level
                _ => return None,
            };
            Some(RawInputEvent::Button {
                button,
                state,
                timestamp,
            })
        }
        _ => None,
    }
}

fn map_button(key: Key) -> Option<MouseButton> {
    match key {
        Key::BTN_LEFT => Some(MouseButton::Left),
        Key::BTN_RIGHT => Some(MouseButton::Right),
        Key::BTN_MIDDLE => Some(MouseButton::Middle),
        _ => None,
    }
}
