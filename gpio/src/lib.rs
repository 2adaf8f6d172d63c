pub mod gpiod;
pub mod debounce;
pub mod raw;
pub mod keypad;
pub mod sim;

use bitvec::vec::BitVec;
use log::{debug, warn};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

/// A GPIO line number, as numbered by the backend (BCM numbering on the Pi).
pub type Pin = usize;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("pin {0} does not exist on this backend")]
    InvalidPin(Pin),
    #[error("pin {pin} is not configured as {expected}")]
    NotConfigured { pin: Pin, expected: GpioDirection },
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// The electrical level of a GPIO line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GpioLevel {
    High,
    Low,
}

impl GpioLevel {
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }

    pub fn is_low(self) -> bool {
        self == GpioLevel::Low
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high { GpioLevel::High } else { GpioLevel::Low }
    }
}

impl From<GpioLevel> for bool {
    fn from(level: GpioLevel) -> Self {
        level.is_high()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GpioDirection {
    Input,
    Output,
}

impl std::fmt::Display for GpioDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GpioDirection::Input => f.write_str("input"),
            GpioDirection::Output => f.write_str("output"),
        }
    }
}

/// Specifies the bias of the GPIO pin.
///
/// You can use this to enable pull-up or pull-down resistors.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// A backend that can drive individual GPIO lines.
///
/// Backends do not track ownership; that is the job of [Gpio].
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> GpioResult<usize>;

    /// Switches the line to input with the given bias.
    fn set_input(&mut self, pin: Pin, bias: GpioBias) -> GpioResult<()>;

    /// Switches the line to output and drives it to `level`.
    fn set_output(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()>;

    /// Drives a line previously switched to output.
    fn write(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()>;

    /// Samples a line previously switched to input.
    fn read(&mut self, pin: Pin) -> GpioResult<GpioLevel>;

    /// Returns the line to input with no bias and gives it back to the system.
    fn reset(&mut self, pin: Pin) -> GpioResult<()>;
}

/// The single owner of every GPIO line the firmware touches.
///
/// Pins must be configured before they are written or read. All configured pins are
/// restored by [Gpio::release_all], which also runs when the value is dropped.
pub struct Gpio {
    driver: Box<dyn GpioDriver>,
    configured: BitVec,
    outputs: BitVec,
}

impl Gpio {
    pub fn new(driver: Box<dyn GpioDriver>) -> GpioResult<Self> {
        let n = driver.count()?;
        Ok(Gpio {
            driver,
            configured: BitVec::repeat(false, n),
            outputs: BitVec::repeat(false, n),
        })
    }

    fn claim(&mut self, pin: Pin) -> GpioResult<()> {
        if pin >= self.configured.len() {
            return Err(GpioError::InvalidPin(pin));
        }
        if self.configured[pin] {
            return Err(GpioError::AlreadyInUse);
        }
        Ok(())
    }

    /// Sets `pin` as an output and drives it to `initial`.
    pub fn configure_output(&mut self, pin: Pin, initial: GpioLevel) -> GpioResult<()> {
        self.claim(pin)?;
        self.driver.set_output(pin, initial)?;
        self.configured.set(pin, true);
        self.outputs.set(pin, true);
        debug!("{:?}: pin {} -> output ({:?})", self.driver, pin, initial);
        Ok(())
    }

    /// Sets `pin` as an input with the internal pull-up enabled.
    pub fn configure_input_pullup(&mut self, pin: Pin) -> GpioResult<()> {
        self.configure_input(pin, GpioBias::PullUp)
    }

    pub fn configure_input(&mut self, pin: Pin, bias: GpioBias) -> GpioResult<()> {
        self.claim(pin)?;
        self.driver.set_input(pin, bias)?;
        self.configured.set(pin, true);
        self.outputs.set(pin, false);
        debug!("{:?}: pin {} -> input ({:?})", self.driver, pin, bias);
        Ok(())
    }

    fn direction(&self, pin: Pin) -> Option<GpioDirection> {
        if pin >= self.configured.len() || !self.configured[pin] {
            return None;
        }
        if self.outputs[pin] {
            Some(GpioDirection::Output)
        } else {
            Some(GpioDirection::Input)
        }
    }

    pub fn write(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        if self.direction(pin) != Some(GpioDirection::Output) {
            return Err(GpioError::NotConfigured { pin, expected: GpioDirection::Output });
        }
        self.driver.write(pin, level)
    }

    pub fn read(&mut self, pin: Pin) -> GpioResult<GpioLevel> {
        if self.direction(pin) != Some(GpioDirection::Input) {
            return Err(GpioError::NotConfigured { pin, expected: GpioDirection::Input });
        }
        self.driver.read(pin)
    }

    /// Whether any pin is still held.
    pub fn is_holding(&self) -> bool {
        self.configured.any()
    }

    /// Restores every configured pin to an input with no bias.
    ///
    /// Calling this again is a no-op. Every pin is attempted even if one fails;
    /// the first failure is returned.
    pub fn release_all(&mut self) -> GpioResult<()> {
        let mut result = Ok(());
        let pins: Vec<Pin> = self.configured.iter_ones().collect();
        for pin in pins {
            if let Err(e) = self.driver.reset(pin) {
                warn!("{:?}: failed to release pin {}: {}", self.driver, pin, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
            self.configured.set(pin, false);
            self.outputs.set(pin, false);
        }
        result
    }
}

impl Debug for Gpio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gpio({:?}, {} pins held)", self.driver, self.configured.count_ones())
    }
}

impl Drop for Gpio {
    fn drop(&mut self) {
        if self.is_holding() {
            debug!("{:?} dropped while holding pins, releasing.", self);
            _ = self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimGpioDriver;

    fn gpio() -> (Gpio, crate::sim::SimHandle) {
        let (driver, handle) = SimGpioDriver::new(28);
        (Gpio::new(Box::new(driver)).unwrap(), handle)
    }

    #[test]
    fn configure_output_drives_initial_level() {
        let (mut gpio, sim) = gpio();
        gpio.configure_output(19, GpioLevel::High).unwrap();
        let pin = sim.pin(19).unwrap();
        assert_eq!(pin.direction, GpioDirection::Output);
        assert_eq!(pin.level, GpioLevel::High);
    }

    #[test]
    fn input_pullup_reads_high_when_open() {
        let (mut gpio, sim) = gpio();
        gpio.configure_input_pullup(17).unwrap();
        assert_eq!(sim.pin(17).unwrap().bias, GpioBias::PullUp);
        assert_eq!(gpio.read(17).unwrap(), GpioLevel::High);
    }

    #[test]
    fn rejects_unknown_and_double_configured_pins() {
        let (mut gpio, _sim) = gpio();
        assert_eq!(gpio.configure_output(40, GpioLevel::High), Err(GpioError::InvalidPin(40)));
        gpio.configure_input_pullup(5).unwrap();
        assert_eq!(gpio.configure_output(5, GpioLevel::High), Err(GpioError::AlreadyInUse));
    }

    #[test]
    fn direction_is_enforced() {
        let (mut gpio, _sim) = gpio();
        gpio.configure_input_pullup(17).unwrap();
        gpio.configure_output(19, GpioLevel::High).unwrap();
        assert!(matches!(gpio.write(17, GpioLevel::Low), Err(GpioError::NotConfigured { pin: 17, .. })));
        assert!(matches!(gpio.read(19), Err(GpioError::NotConfigured { pin: 19, .. })));
        assert!(matches!(gpio.read(3), Err(GpioError::NotConfigured { pin: 3, .. })));
    }

    #[test]
    fn release_all_is_idempotent() {
        let (mut gpio, sim) = gpio();
        gpio.configure_output(19, GpioLevel::Low).unwrap();
        gpio.configure_input_pullup(17).unwrap();
        gpio.release_all().unwrap();
        assert!(!gpio.is_holding());
        for pin in [17, 19] {
            let state = sim.pin(pin).unwrap();
            assert_eq!(state.direction, GpioDirection::Input);
            assert_eq!(state.bias, GpioBias::None);
        }
        assert_eq!(sim.reset_count(), 2);
        gpio.release_all().unwrap();
        assert_eq!(sim.reset_count(), 2);
    }

    #[test]
    fn drop_releases_pins() {
        let (mut gpio, sim) = gpio();
        gpio.configure_output(13, GpioLevel::High).unwrap();
        drop(gpio);
        assert_eq!(sim.pin(13).unwrap().direction, GpioDirection::Input);
        assert_eq!(sim.reset_count(), 1);
    }
}
