//! An in-memory GPIO backend that models a passive switch matrix.
//!
//! Contacts join two lines. An input line reads Low if any contact joins it to an output
//! currently driven Low; otherwise it follows its bias (floating inputs read Low).
//! Used by the tests and by the `sim` backend on machines without a GPIO header.
use crate::{GpioBias, GpioDirection, GpioDriver, GpioError, GpioLevel, GpioResult, Pin};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimPin {
    pub direction: GpioDirection,
    pub bias: GpioBias,
    /// Last driven level for outputs.
    pub level: GpioLevel,
}

#[derive(Debug, Default)]
struct SimState {
    pins: HashMap<Pin, SimPin>,
    contacts: BTreeSet<(Pin, Pin)>,
    read_failures: u32,
    write_failures: u32,
    resets: usize,
}

impl SimState {
    fn sample(&self, pin: Pin) -> GpioLevel {
        let pulled_low = self
            .contacts
            .iter()
            .filter_map(|&(a, b)| {
                if a == pin {
                    Some(b)
                } else if b == pin {
                    Some(a)
                } else {
                    None
                }
            })
            .filter_map(|other| self.pins.get(&other))
            .any(|other| other.direction == GpioDirection::Output && other.level.is_low());

        if pulled_low {
            return GpioLevel::Low;
        }

        match self.pins.get(&pin).map(|p| p.bias) {
            Some(GpioBias::PullUp) => GpioLevel::High,
            _ => GpioLevel::Low,
        }
    }
}

fn contact(a: Pin, b: Pin) -> (Pin, Pin) {
    if a <= b { (a, b) } else { (b, a) }
}

/// The test-side handle of a [SimGpioDriver]: closes contacts and injects faults.
#[derive(Clone)]
pub struct SimHandle {
    state: Rc<RefCell<SimState>>,
}

impl SimHandle {
    /// Closes the contact between two lines (pressing a matrix key).
    pub fn connect(&self, a: Pin, b: Pin) {
        self.state.borrow_mut().contacts.insert(contact(a, b));
    }

    /// Opens the contact between two lines.
    pub fn disconnect(&self, a: Pin, b: Pin) {
        self.state.borrow_mut().contacts.remove(&contact(a, b));
    }

    pub fn disconnect_all(&self) {
        self.state.borrow_mut().contacts.clear();
    }

    /// Makes the next `n` reads fail with an IO error.
    pub fn fail_reads(&self, n: u32) {
        self.state.borrow_mut().read_failures = n;
    }

    /// Makes the next `n` writes fail with an IO error.
    pub fn fail_writes(&self, n: u32) {
        self.state.borrow_mut().write_failures = n;
    }

    pub fn pin(&self, pin: Pin) -> Option<SimPin> {
        self.state.borrow().pins.get(&pin).copied()
    }

    /// How many times a line has been handed back through [GpioDriver::reset].
    pub fn reset_count(&self) -> usize {
        self.state.borrow().resets
    }
}

impl Debug for SimHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimHandle({} contacts)", self.state.borrow().contacts.len())
    }
}

pub struct SimGpioDriver {
    count: usize,
    state: Rc<RefCell<SimState>>,
}

impl SimGpioDriver {
    /// Creates a simulated chip with `count` lines.
    pub fn new(count: usize) -> (Self, SimHandle) {
        let state = Rc::new(RefCell::new(SimState::default()));
        let handle = SimHandle { state: Rc::clone(&state) };
        (SimGpioDriver { count, state }, handle)
    }

    fn check(&self, pin: Pin) -> GpioResult<()> {
        if pin >= self.count {
            return Err(GpioError::InvalidPin(pin));
        }
        Ok(())
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpioDriver({})", self.count)
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.count)
    }

    fn set_input(&mut self, pin: Pin, bias: GpioBias) -> GpioResult<()> {
        self.check(pin)?;
        self.state.borrow_mut().pins.insert(pin, SimPin {
            direction: GpioDirection::Input,
            bias,
            level: GpioLevel::Low,
        });
        Ok(())
    }

    fn set_output(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        self.check(pin)?;
        self.state.borrow_mut().pins.insert(pin, SimPin {
            direction: GpioDirection::Output,
            bias: GpioBias::None,
            level,
        });
        Ok(())
    }

    fn write(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        self.check(pin)?;
        let mut state = self.state.borrow_mut();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(GpioError::Io(std::io::ErrorKind::Other));
        }
        match state.pins.get_mut(&pin) {
            Some(p) if p.direction == GpioDirection::Output => {
                p.level = level;
                Ok(())
            }
            _ => Err(GpioError::NotConfigured { pin, expected: GpioDirection::Output }),
        }
    }

    fn read(&mut self, pin: Pin) -> GpioResult<GpioLevel> {
        self.check(pin)?;
        let mut state = self.state.borrow_mut();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(GpioError::Io(std::io::ErrorKind::Other));
        }
        Ok(state.sample(pin))
    }

    fn reset(&mut self, pin: Pin) -> GpioResult<()> {
        self.check(pin)?;
        let mut state = self.state.borrow_mut();
        state.resets += 1;
        state.pins.insert(pin, SimPin {
            direction: GpioDirection::Input,
            bias: GpioBias::None,
            level: GpioLevel::Low,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_contact_pulls_row_low_only_while_column_is_low() {
        let (mut driver, sim) = SimGpioDriver::new(28);
        driver.set_output(19, GpioLevel::High).unwrap();
        driver.set_input(17, GpioBias::PullUp).unwrap();
        sim.connect(17, 19);
        assert_eq!(driver.read(17).unwrap(), GpioLevel::High);
        driver.write(19, GpioLevel::Low).unwrap();
        assert_eq!(driver.read(17).unwrap(), GpioLevel::Low);
        sim.disconnect(19, 17);
        assert_eq!(driver.read(17).unwrap(), GpioLevel::High);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let (mut driver, sim) = SimGpioDriver::new(28);
        driver.set_input(17, GpioBias::PullUp).unwrap();
        sim.fail_reads(2);
        assert!(driver.read(17).is_err());
        assert!(driver.read(17).is_err());
        assert_eq!(driver.read(17).unwrap(), GpioLevel::High);
    }
}
