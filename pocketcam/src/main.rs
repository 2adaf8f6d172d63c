mod app;
mod camera;
mod config;
mod dispatch;
mod display;
mod media;
mod runner;
mod settings;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use dotenv::dotenv;
use eyre::WrapErr;
use log::{debug, error, info, warn};
use sysinfo::System;
use pocketcam_gpio::debounce::EventEncoder;
use pocketcam_gpio::gpiod::GpiodDriver;
use pocketcam_gpio::keypad::{GpioKeypad, KeyMap};
use pocketcam_gpio::raw::RawGpioDriver;
use pocketcam_gpio::sim::SimGpioDriver;
use pocketcam_gpio::{Gpio, GpioDriver, GpioResult};
use crate::app::App;
use crate::camera::CommandCamera;
use crate::config::{AppConfig, ConfigError, GpioBackend};
use crate::display::LogDisplay;
use crate::media::DirMediaStore;
use crate::runner::Runner;
use crate::settings::{Settings, SettingsStore};

/// Lines on the simulated chip; enough for the BCM header numbering.
const SIM_LINES: usize = 28;

fn main() -> ExitCode {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "PocketCam v{} on {}",
        env!("CARGO_PKG_VERSION"),
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!("Architecture {}", System::cpu_arch());

    match try_main() {
        Ok(()) => {
            info!("Bye.");
            ExitCode::SUCCESS
        }
        Err(report) => {
            error!("{:?}", report);
            ExitCode::from(exit_code(&report))
        }
    }
}

/// 2 for bad configuration, 1 for everything else (GPIO and other hardware failures).
fn exit_code(report: &eyre::Report) -> u8 {
    if report.chain().any(|cause| cause.is::<ConfigError>()) {
        2
    } else {
        1
    }
}

fn open_driver(backend: &GpioBackend) -> GpioResult<Box<dyn GpioDriver>> {
    let driver: Box<dyn GpioDriver> = match backend {
        GpioBackend::GpioMem => Box::new(RawGpioDriver::new_gpiomem()?),
        GpioBackend::Mem => Box::new(RawGpioDriver::new_mem()?),
        GpioBackend::Gpiod(chip) => Box::new(GpiodDriver::open(chip)?),
        GpioBackend::Sim => {
            warn!("Using simulated GPIO, no button will ever close.");
            let (driver, _handle) = SimGpioDriver::new(SIM_LINES);
            Box::new(driver)
        }
    };
    Ok(driver)
}

fn try_main() -> eyre::Result<()> {
    let config = AppConfig::from_env().wrap_err("Invalid configuration")?;

    info!("Keypad @ Cols: {:?}, Rows: {:?}", config.cols, config.rows);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .wrap_err("Failed to install the termination handler")?;
    }

    debug!("Initializing GPIO driver...");
    let driver = open_driver(&config.backend)
        .wrap_err_with(|| format!("Failed to open GPIO backend {:?}", config.backend))?;
    let gpio = Gpio::new(driver).wrap_err("Failed to initialize GPIO")?;
    debug!("{:?} initialized.", gpio);

    debug!("Initializing keypad driver...");
    let keypad = GpioKeypad::new(gpio, config.cols, config.rows, KeyMap::camera())
        .wrap_err("Failed to claim the keypad lines")?;
    debug!("{:?} initialized.", keypad);

    debug!("Trying to load settings...");
    let store = SettingsStore::from_env();
    let settings = if let Some(settings) = store.try_load() {
        info!("Settings loaded from {}.", store.path().display());
        settings
    } else {
        info!("Settings not found. Using default");
        let settings = Settings::default();
        match store.save(&settings) {
            Ok(()) => info!("Default settings saved."),
            Err(e) => warn!("Could not save default settings: {}", e),
        }
        settings
    };

    let camera = CommandCamera::new(&config.media_dir)
        .wrap_err_with(|| format!("Failed to create {}", config.media_dir.display()))?;
    let media = DirMediaStore::new(&config.media_dir);

    let mut app = App::new(settings, store, Box::new(camera), Box::new(media), Box::new(LogDisplay));
    if let Err(e) = app.render() {
        warn!("Failed to draw the preview: {}", e);
    }

    let encoder = EventEncoder::new(keypad.keymap().clone(), config.input);
    let mut runner = Runner::new(keypad, encoder, app, shutdown);

    info!("PocketCam initialized.");
    runner.run()?;
    Ok(())
}
