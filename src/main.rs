use color_eyre::{eyre::eyre, Result};
use evdev::Key;
use mousedrive::config::DriveConfig;
use mousedrive::driver::DriverHandle;
use mousedrive::input::event_collector::discover_mouse;
use mousedrive::input::keys::{discover_keyboard, key_from_name};
use mousedrive::input::{CollectorHandle, EvdevKeys, KeyLevelSource, NoKeys};
use mousedrive::output::{DeviceId, VirtualJoystick};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = DriveConfig::default_path();
    let config = DriveConfig::load(&config_path)?;
    config.validate()?;
    info!(
        "Tick {}ms, sensitivity {}, delta cap {}",
        config.nominal_interval_ms(),
        config.steering.sensitivity,
        config.steering.delta_cap
    );

    let gear_up = resolve_key(&config.device.gear_up_key)?;
    let gear_down = resolve_key(&config.device.gear_down_key)?;

    let mouse_path = match &config.device.mouse_path {
        Some(path) => path.clone(),
        None => discover_mouse()?,
    };
    let keys = open_keys(&config, gear_up, gear_down);

    let device = DeviceId(config.device.id);
    let mut joystick = VirtualJoystick::create(device, &config.device.name)?;
    match joystick.device_path() {
        Some(path) => info!("Virtual wheel {} available at {:?}", device, path),
        None => warn!("Virtual wheel {} created but its device node is unknown", device),
    }

    log_controls(&config);

    let (event_sender, event_receiver) = mpsc::channel(1000);
    let _collector = CollectorHandle::spawn(&mouse_path, event_sender)?;

    let cancel = CancellationToken::new();
    let driver = DriverHandle::spawn(
        config,
        event_receiver,
        keys,
        Box::new(joystick),
        device,
        cancel.clone(),
    );

    let driver_task = driver.join();
    tokio::pin!(driver_task);

    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
        result = &mut driver_task => {
            result?;
            false
        }
    };
    if !interrupted {
        return Err(eyre!("Tick driver stopped unexpectedly"));
    }

    info!("Ctrl+C received, shutting down");
    cancel.cancel();
    driver_task.await?;
    info!("Virtual wheel released");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn resolve_key(name: &str) -> Result<Key> {
    key_from_name(name).ok_or_else(|| eyre!("Unknown gear key name {:?}", name))
}

// Gears are optional; without a keyboard they stay released
fn open_keys(config: &DriveConfig, gear_up: Key, gear_down: Key) -> Box<dyn KeyLevelSource> {
    let path = match &config.device.keyboard_path {
        Some(path) => Ok(path.clone()),
        None => discover_keyboard(gear_up, gear_down),
    };

    match path.and_then(|path| EvdevKeys::open(&path, gear_up, gear_down)) {
        Ok(keys) => Box::new(keys),
        Err(e) => {
            warn!("Gear keys disabled: {}", e);
            Box::new(NoKeys)
        }
    }
}

fn log_controls(config: &DriveConfig) {
    info!("Controls:");
    info!("  Mouse left/right  steer");
    info!("  Middle button     center steering");
    info!("  Left button       throttle");
    info!("  Right button      brake");
    info!(
        "  {} / {}            gear up / gear down",
        config.device.gear_up_key, config.device.gear_down_key
    );
    info!("  Ctrl+C            quit");
}
