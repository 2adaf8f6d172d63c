//! GPIO backend on top of the Linux GPIO character device, using the gpiod library.
//!
//! Each configured pin holds its own line request; dropping the request hands the line
//! back to the kernel.
use crate::{GpioBias, GpioDirection, GpioDriver, GpioError, GpioLevel, GpioResult, Pin};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

enum Request {
    Input(gpiod::Lines<gpiod::Input>),
    Output(gpiod::Lines<gpiod::Output>),
}

pub struct GpiodDriver {
    chip: gpiod::Chip,
    requests: HashMap<Pin, Request>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        Self {
            chip,
            requests: HashMap::new(),
        }
    }

    /// Opens the chip at `path`, e.g. `/dev/gpiochip0`.
    pub fn open(path: &str) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path)?))
    }

    fn check(&self, pin: Pin) -> GpioResult<u32> {
        if pin >= self.chip.num_lines() as usize {
            return Err(GpioError::InvalidPin(pin));
        }
        Ok(pin as u32)
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn set_input(&mut self, pin: Pin, bias: GpioBias) -> GpioResult<()> {
        let line = self.check(pin)?;
        // The kernel refuses a second request for a line we already hold.
        self.requests.remove(&pin);
        let lines = self.chip.request_lines(
            gpiod::Options::input([line])
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(bias.into()),
        )?;
        self.requests.insert(pin, Request::Input(lines));
        Ok(())
    }

    fn set_output(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        let line = self.check(pin)?;
        self.requests.remove(&pin);
        let lines = self.chip.request_lines(
            gpiod::Options::output([line])
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(gpiod::Bias::Disable),
        )?;
        lines.set_values([level.is_high()])?;
        self.requests.insert(pin, Request::Output(lines));
        Ok(())
    }

    fn write(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        match self.requests.get(&pin) {
            Some(Request::Output(lines)) => {
                lines.set_values([level.is_high()])?;
                Ok(())
            }
            _ => Err(GpioError::NotConfigured { pin, expected: GpioDirection::Output }),
        }
    }

    fn read(&mut self, pin: Pin) -> GpioResult<GpioLevel> {
        match self.requests.get(&pin) {
            Some(Request::Input(lines)) => {
                let [value] = lines.get_values([false])?;
                Ok(GpioLevel::from(value))
            }
            _ => Err(GpioError::NotConfigured { pin, expected: GpioDirection::Input }),
        }
    }

    fn reset(&mut self, pin: Pin) -> GpioResult<()> {
        let line = self.check(pin)?;
        self.requests.remove(&pin);
        // Re-request as a plain input and let it go, so the line is not left driven.
        let lines = self.chip.request_lines(
            gpiod::Options::input([line])
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(gpiod::Bias::Disable),
        )?;
        drop(lines);
        Ok(())
    }
}
