use chrono::Local;
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::DriverError;
use crate::config::DriveConfig;
use crate::input::{InputAggregator, KeyLevelSource, RawInputEvent};
use crate::output::{AxisMapper, DeviceId, MappedOutput, OutputSink};
use crate::shaping::{DriveFrame, ShapingPipeline, TickInput};

/// Input gathered for one tick
#[derive(Debug, Clone, Copy)]
pub struct TickBatch {
    pub input: TickInput,
    pub events: usize,
    pub now: Instant,
}

// Define driver states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum TickState {
    Waiting,
    Shaping(TickBatch),
    Publishing(DriveFrame),
}

#[machine]
pub struct TickDriver<S: TickState> {
    // Raw events from the collector thread
    event_receiver: mpsc::Receiver<RawInputEvent>,

    // Pending motion and button levels between ticks
    aggregator: InputAggregator,

    // Gear key levels
    keys: Box<dyn KeyLevelSource>,

    // Control state and update operation
    pipeline: ShapingPipeline,

    // Virtual joystick
    sink: Box<dyn OutputSink>,
    device: DeviceId,

    // Latest frame for observers
    frame_sender: watch::Sender<DriveFrame>,

    // False once the collector hung up
    input_connected: bool,
}

// Implementation of methods available in all states
impl<S: TickState> TickDriver<S> {
    pub fn subscribe(&self) -> watch::Receiver<DriveFrame> {
        self.frame_sender.subscribe()
    }

    pub fn config(&self) -> &DriveConfig {
        self.pipeline.config()
    }

    pub fn pipeline(&self) -> &ShapingPipeline {
        &self.pipeline
    }
}

// Implementation for Waiting state
impl TickDriver<Waiting> {
    pub fn create(
        config: DriveConfig,
        event_receiver: mpsc::Receiver<RawInputEvent>,
        keys: Box<dyn KeyLevelSource>,
        sink: Box<dyn OutputSink>,
        device: DeviceId,
        now: Instant,
    ) -> Self {
        info!("Creating tick driver for device {}", device);
        let aggregator = InputAggregator::new(config.steering.delta_cap);
        let pipeline = ShapingPipeline::new(config, now);
        let (frame_sender, _) = watch::channel(DriveFrame::default());

        Self::new(
            event_receiver,
            aggregator,
            keys,
            pipeline,
            sink,
            device,
            frame_sender,
            true,
        )
    }

    // Drain the input queue and sample the keyboard
    pub fn collect(mut self, now: Instant) -> TickDriver<Shaping> {
        let mut events = 0;

        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => {
                    self.aggregator.apply(&event);
                    events += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if self.input_connected {
                        error!("Input channel disconnected, releasing throttle and brake");
                        self.aggregator.release_all();
                        self.input_connected = false;
                    }
                    break;
                }
            }
        }

        let keys = self.keys.sample();
        let input = self.aggregator.take_tick_input(keys);
        if events > 0 {
            debug!("Collected {} input events: {:?}", events, input);
        }

        self.transition_with(TickBatch { input, events, now })
    }

    /// Leaves the device centered with pedals up
    pub fn release(mut self) -> Result<(), DriverError> {
        info!("Releasing virtual joystick {}", self.device);
        MappedOutput::neutral().send(self.sink.as_mut(), self.device)?;
        Ok(())
    }
}

// Implementation for Shaping state
impl TickDriver<Shaping> {
    pub fn shape(mut self) -> TickDriver<Publishing> {
        let frame = match self.get_state_data().copied() {
            Some(batch) => self.pipeline.update(&batch.input, batch.now),
            None => {
                warn!("No tick batch found in state data, this should not happen");
                self.pipeline.update(&TickInput::default(), Instant::now())
            }
        };
        self.transition_with(frame)
    }
}

// Implementation for Publishing state
impl TickDriver<Publishing> {
    pub fn publish(mut self) -> Result<TickDriver<Waiting>, DriverError> {
        let frame = self.get_state_data().copied().unwrap_or_default();
        let mapped = AxisMapper::map(&frame);

        if let Err(e) = mapped.send(self.sink.as_mut(), self.device) {
            error!("Failed to write to virtual joystick {}: {}", self.device, e);
            return Err(e.into());
        }

        self.frame_sender.send_replace(frame);
        Ok(self.transition())
    }
}

/// One full pass: collect, shape, publish
pub fn run_tick(
    driver: TickDriver<Waiting>,
    now: Instant,
) -> Result<(TickDriver<Waiting>, usize), DriverError> {
    let shaping = driver.collect(now);
    let events = shaping.get_state_data().map_or(0, |batch| batch.events);
    let driver = shaping.shape().publish()?;
    Ok((driver, events))
}

// Run the tick loop until cancelled
pub async fn run_tick_loop(
    mut driver: TickDriver<Waiting>,
    cancel: CancellationToken,
) -> Result<(), DriverError> {
    let interval_ms = driver.config().nominal_interval_ms() as u64;
    info!("Starting tick loop with {}ms interval", interval_ms);

    let mut interval_timer = tokio::time::interval(Duration::from_millis(interval_ms));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Stats for performance monitoring
    let mut ticks: u64 = 0;
    let mut total_events: usize = 0;
    let mut busy = Duration::ZERO;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        let tick_at = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown requested after {} ticks", ticks);
                break;
            }
            tick_at = interval_timer.tick() => tick_at.into_std(),
        };

        let cycle_start = Instant::now();
        let (next, events) = run_tick(driver, tick_at)?;
        driver = next;
        busy += cycle_start.elapsed();
        ticks += 1;
        total_events += events;

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            info!(
                "Tick stats: {} ticks, {} input events in {} seconds ({:.1} ticks/sec, {:.1} µs/tick)",
                ticks,
                total_events,
                elapsed_seconds,
                ticks as f64 / elapsed_seconds as f64,
                busy.as_secs_f64() * 1e6 / ticks.max(1) as f64
            );
            ticks = 0;
            total_events = 0;
            busy = Duration::ZERO;
            last_stats_time = now;
        }
    }

    driver.release()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ButtonState, GearKeys, MouseButton, NoKeys};
    use crate::output::{AxisId, OutputError, RecordingSink, AXIS_CENTER};
    use crate::shaping::brake::BrakePhase;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<RecordingSink>>);

    impl OutputSink for SharedSink {
        fn set_axis(
            &mut self,
            device: DeviceId,
            axis: AxisId,
            value: i32,
        ) -> Result<(), OutputError> {
            self.0.lock().unwrap().set_axis(device, axis, value)
        }

        fn set_button(
            &mut self,
            device: DeviceId,
            button: u8,
            pressed: bool,
        ) -> Result<(), OutputError> {
            self.0.lock().unwrap().set_button(device, button, pressed)
        }
    }

    struct HeldGearUp;

    impl KeyLevelSource for HeldGearUp {
        fn sample(&mut self) -> GearKeys {
            GearKeys {
                up: true,
                down: false,
            }
        }
    }

    struct BrokenSink;

    impl OutputSink for BrokenSink {
        fn set_axis(&mut self, device: DeviceId, _: AxisId, _: i32) -> Result<(), OutputError> {
            Err(OutputError::UnknownDevice(device))
        }

        fn set_button(&mut self, device: DeviceId, _: u8, _: bool) -> Result<(), OutputError> {
            Err(OutputError::UnknownDevice(device))
        }
    }

    fn button(button: MouseButton, state: ButtonState) -> RawInputEvent {
        RawInputEvent::Button {
            button,
            state,
            timestamp: Local::now(),
        }
    }

    fn driver_with(
        keys: Box<dyn KeyLevelSource>,
        t0: Instant,
    ) -> (TickDriver<Waiting>, mpsc::Sender<RawInputEvent>, SharedSink) {
        let (tx, rx) = mpsc::channel(1000);
        let sink = SharedSink::default();
        let driver = TickDriver::create(
            DriveConfig::default(),
            rx,
            keys,
            Box::new(sink.clone()),
            DeviceId(1),
            t0,
        );
        (driver, tx, sink)
    }

    #[test]
    fn test_tick_publishes_mapped_frame() {
        let t0 = Instant::now();
        let (driver, tx, sink) = driver_with(Box::new(HeldGearUp), t0);
        let frames = driver.subscribe();

        tx.try_send(RawInputEvent::Motion {
            dx: 100,
            timestamp: Local::now(),
        })
        .unwrap();
        tx.try_send(button(MouseButton::Left, ButtonState::Pressed))
            .unwrap();

        let (_driver, events) = run_tick(driver, t0 + Duration::from_millis(4)).unwrap();
        assert_eq!(events, 2);

        let frame = *frames.borrow();
        assert_eq!(frame.steering, 300.0);
        assert!(frame.throttle > 0.0);
        assert!(frame.gear_up);

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.axes[0], (DeviceId(1), AxisId::X, AXIS_CENTER + 300));
        assert_eq!(recorded.buttons[0], (DeviceId(1), 1, true));
        assert_eq!(recorded.buttons[1], (DeviceId(1), 2, false));
    }

    #[test]
    fn test_disconnect_releases_held_pedals() {
        let t0 = Instant::now();
        let (driver, tx, _sink) = driver_with(Box::new(NoKeys), t0);
        tx.try_send(button(MouseButton::Right, ButtonState::Pressed))
            .unwrap();

        let (driver, _) = run_tick(driver, t0 + Duration::from_millis(4)).unwrap();
        assert!(matches!(driver.pipeline().brake_phase(), BrakePhase::Apply { .. }));

        drop(tx);
        let (driver, _) = run_tick(driver, t0 + Duration::from_millis(8)).unwrap();
        assert!(matches!(
            driver.pipeline().brake_phase(),
            BrakePhase::PostReleaseHold { .. }
        ));

        // Keeps ticking without input
        let (driver, events) = run_tick(driver, t0 + Duration::from_millis(12)).unwrap();
        assert_eq!(events, 0);
        assert!(driver.release().is_ok());
    }

    #[test]
    fn test_output_failure_stops_driver() {
        let (_tx, rx) = mpsc::channel(10);
        let t0 = Instant::now();
        let driver = TickDriver::create(
            DriveConfig::default(),
            rx,
            Box::new(NoKeys),
            Box::new(BrokenSink),
            DeviceId(1),
            t0,
        );
        assert!(matches!(
            run_tick(driver, t0 + Duration::from_millis(4)),
            Err(DriverError::OutputError(_))
        ));
    }

    #[tokio::test]
    async fn test_loop_runs_until_cancelled() {
        let t0 = Instant::now();
        let (driver, tx, sink) = driver_with(Box::new(NoKeys), t0);
        let frames = driver.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_tick_loop(driver, cancel.clone()));
        tx.send(button(MouseButton::Left, ButtonState::Pressed))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(frames.borrow().throttle > 0.0);

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());

        // Device is left neutral on shutdown
        let recorded = sink.0.lock().unwrap();
        let last_axes: Vec<_> = recorded.axes.iter().rev().take(3).copied().collect();
        assert_eq!(
            last_axes,
            vec![
                (DeviceId(1), AxisId::RZ, 0),
                (DeviceId(1), AxisId::Y, 0),
                (DeviceId(1), AxisId::X, AXIS_CENTER),
            ]
        );
    }
}
