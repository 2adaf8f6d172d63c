mod encoder;

use std::fmt::{Display, Formatter};
use std::time::Duration;
pub use encoder::*;

/// A point on a wrapping 32-bit millisecond clock.
///
/// Only differences between timestamps are meaningful; they are computed with wrapping
/// arithmetic so an interval spanning the rollover is measured correctly.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const fn from_millis(ms: u32) -> Self {
        Timestamp(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    pub const fn since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub fn after(self, duration: Duration) -> Self {
        Timestamp(self.0.wrapping_add(duration.as_millis() as u32))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Mode hints the UI may send back to the input layer.
pub trait InputControl {
    /// Globally allows or suppresses auto-repeat. While suppressed, no button repeats.
    fn set_repeat_enabled(&mut self, enabled: bool);

    fn repeat_enabled(&self) -> bool;
}
