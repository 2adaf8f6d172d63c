//! Direct register access to the BCM2711 GPIO block through a memory mapping.
use crate::{GpioBias, GpioDriver, GpioError, GpioLevel, GpioResult, Pin};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;

/// Register offsets (in bytes) from the start of the GPIO block.
mod reg {
    /// GPFSELn, 3 bits per pin, 10 pins per register.
    pub const GPFSEL0: usize = 0x00;
    /// GPSETn, 1 bit per pin, write-only.
    pub const GPSET0: usize = 0x1c;
    /// GPCLRn, 1 bit per pin, write-only.
    pub const GPCLR0: usize = 0x28;
    /// GPLEVn, 1 bit per pin, read-only.
    pub const GPLEV0: usize = 0x34;
    /// GPIO_PUP_PDN_CNTRL_REGn (yes that is a long name), 2 bits per pin.
    pub const GPIO_PUP_PDN_CNTRL_REG0: usize = 0xe4;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
enum PinFunction {
    Input = 0b000,
    Output = 0b001,
}

pub struct RawGpioDriver {
    mmap: MmapRaw,
}

impl RawGpioDriver {
    /// Physical address of the GPIO block on the BCM2711 (Pi 4).
    pub const GPIO_BASE: u64 = 0xFE200000;

    const PIN_COUNT: usize = 58;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(4096)
            .map_raw(&file)?;

        Ok(RawGpioDriver { mmap })
    }

    /// Maps `/dev/gpiomem`, which exposes only the GPIO block and needs no root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block out of `/dev/mem`. Needs root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE)
    }

    fn check(pin: Pin) -> GpioResult<()> {
        if pin >= Self::PIN_COUNT {
            return Err(GpioError::InvalidPin(pin));
        }
        Ok(())
    }

    fn register(&self, offset: usize, index: usize) -> *mut u32 {
        let base = self.mmap.as_mut_ptr() as *mut u32;
        // SAFETY: callers pass a register offset from `reg` and an index derived from a
        // checked pin number, so the address stays inside the 4 KiB mapping.
        unsafe { base.add(offset / 4 + index) }
    }

    /// Replaces `width` bits at `shift` of the register with `value`.
    fn modify(&self, offset: usize, index: usize, shift: usize, width: usize, value: u32) {
        let mask = ((1u32 << width) - 1) << shift;
        let ptr = self.register(offset, index);
        // SAFETY: see `register`.
        unsafe {
            let current = ptr.read_volatile();
            ptr.write_volatile((current & !mask) | ((value << shift) & mask));
        }
    }

    fn set_function(&self, pin: Pin, function: PinFunction) {
        self.modify(reg::GPFSEL0, pin / 10, (pin % 10) * 3, 3, function as u32);
    }

    fn set_bias(&self, pin: Pin, bias: GpioBias) {
        let value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };
        self.modify(reg::GPIO_PUP_PDN_CNTRL_REG0, pin / 16, (pin % 16) * 2, 2, value);
    }

    fn drive(&self, pin: Pin, level: GpioLevel) {
        let offset = match level {
            GpioLevel::High => reg::GPSET0,
            GpioLevel::Low => reg::GPCLR0,
        };
        // SAFETY: see `register`. Set/clear registers ignore zero bits, so no read is needed.
        unsafe { self.register(offset, pin / 32).write_volatile(1 << (pin % 32)) };
    }

    fn level(&self, pin: Pin) -> GpioLevel {
        // SAFETY: see `register`.
        let value = unsafe { self.register(reg::GPLEV0, pin / 32).read_volatile() };
        GpioLevel::from((value >> (pin % 32)) & 1 != 0)
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn set_input(&mut self, pin: Pin, bias: GpioBias) -> GpioResult<()> {
        Self::check(pin)?;
        self.set_function(pin, PinFunction::Input);
        self.set_bias(pin, bias);
        Ok(())
    }

    fn set_output(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        Self::check(pin)?;
        self.set_bias(pin, GpioBias::None);
        // Latch the level first so the pin never glitches to the opposite state.
        self.drive(pin, level);
        self.set_function(pin, PinFunction::Output);
        Ok(())
    }

    fn write(&mut self, pin: Pin, level: GpioLevel) -> GpioResult<()> {
        Self::check(pin)?;
        self.drive(pin, level);
        Ok(())
    }

    fn read(&mut self, pin: Pin) -> GpioResult<GpioLevel> {
        Self::check(pin)?;
        Ok(self.level(pin))
    }

    fn reset(&mut self, pin: Pin) -> GpioResult<()> {
        Self::check(pin)?;
        self.set_function(pin, PinFunction::Input);
        self.set_bias(pin, GpioBias::None);
        Ok(())
    }
}
