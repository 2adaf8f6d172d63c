//! Startup configuration read from the environment (and `.env`).
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use log::debug;
use thiserror::Error;
use pocketcam_gpio::Pin;
use pocketcam_gpio::debounce::DebounceConfig;
use crate::utils::WithinExt;

/// Columns, as col 0..3. Must match the hardware.
pub const COL_PINS: [Pin; 4] = [19, 13, 6, 5];
/// Rows, as row 0..3. Must match the hardware.
pub const ROW_PINS: [Pin; 4] = [17, 22, 23, 27];

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be an unsigned integer, got {value:?}")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} must be at least {min}, got {value}")]
    TooSmall { name: &'static str, value: u64, min: u64 },
    #[error("unknown GPIO backend {0:?} (expected gpiomem, mem, gpiod[:<chip>] or sim)")]
    UnknownBackend(String),
    #[error("pin {0} is wired more than once")]
    DuplicatePin(Pin),
}

/// Which GPIO backend drives the keypad lines.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GpioBackend {
    /// Registers through `/dev/gpiomem`.
    GpioMem,
    /// Registers through `/dev/mem`.
    Mem,
    /// The GPIO character device at the given path.
    Gpiod(String),
    /// The in-memory matrix model.
    Sim,
}

impl FromStr for GpioBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "gpiomem" => Ok(GpioBackend::GpioMem),
            "mem" => Ok(GpioBackend::Mem),
            "gpiod" => Ok(GpioBackend::Gpiod("/dev/gpiochip0".to_string())),
            "sim" => Ok(GpioBackend::Sim),
            other => match other.strip_prefix("gpiod:") {
                Some(chip) if !chip.is_empty() => Ok(GpioBackend::Gpiod(chip.to_string())),
                _ => Err(ConfigError::UnknownBackend(other.to_string())),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub input: DebounceConfig,
    pub backend: GpioBackend,
    pub media_dir: PathBuf,
    pub cols: [Pin; 4],
    pub rows: [Pin; 4],
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64, min: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed: u64 = value.trim().parse().map_err(|_| ConfigError::NotANumber {
        name,
        value: value.clone(),
    })?;
    if !parsed.within(min..) {
        return Err(ConfigError::TooSmall { name, value: parsed, min });
    }
    Ok(parsed)
}

fn check_wiring(cols: &[Pin; 4], rows: &[Pin; 4]) -> Result<(), ConfigError> {
    let mut seen = Vec::with_capacity(8);
    for &pin in cols.iter().chain(rows) {
        if seen.contains(&pin) {
            return Err(ConfigError::DuplicatePin(pin));
        }
        seen.push(pin);
    }
    Ok(())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = DebounceConfig::default();

        let tick_ms = parse_u64("INPUT_TICK_MS", lookup("INPUT_TICK_MS"), 20, 1)?;
        let samples = parse_u64("INPUT_DEBOUNCE_SAMPLES", lookup("INPUT_DEBOUNCE_SAMPLES"), 2, 1)?;
        let initial_ms = parse_u64("INPUT_REPEAT_INITIAL_MS", lookup("INPUT_REPEAT_INITIAL_MS"), 400, 0)?;
        let interval_ms = parse_u64("INPUT_REPEAT_INTERVAL_MS", lookup("INPUT_REPEAT_INTERVAL_MS"), 120, 0)?;

        let input = DebounceConfig {
            tick_period: Duration::from_millis(tick_ms),
            debounce_samples: u32::try_from(samples).unwrap_or(u32::MAX),
            repeat_initial_delay: Duration::from_millis(initial_ms),
            repeat_interval: Duration::from_millis(interval_ms),
            ..defaults
        };

        let backend = match lookup("POCKETCAM_GPIO") {
            Some(value) => value.parse()?,
            None => GpioBackend::GpioMem,
        };

        let media_dir = lookup("POCKETCAM_MEDIA_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("media"));

        check_wiring(&COL_PINS, &ROW_PINS)?;

        let config = AppConfig {
            input,
            backend,
            media_dir,
            cols: COL_PINS,
            rows: ROW_PINS,
        };
        debug!("{:?}", config);
        Ok(config)
    }
}
