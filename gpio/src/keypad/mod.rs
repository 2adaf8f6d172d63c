mod gpio;
mod keymap;

use crate::GpioError;
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;
pub use gpio::*;
pub use keymap::*;

/// The set of matrix cells observed closed during one sweep of all columns.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ScanFrame(u16);

impl ScanFrame {
    pub const fn empty() -> Self {
        ScanFrame(0)
    }

    const fn bit(row: u8, col: u8) -> u16 {
        1 << (row as u16 * KeyMap::COLS as u16 + col as u16)
    }

    /// Returns the frame with `(row, col)` marked closed. Out-of-range cells are ignored.
    pub fn with(self, row: u8, col: u8) -> Self {
        let mut frame = self;
        frame.insert(row, col);
        frame
    }

    pub fn insert(&mut self, row: u8, col: u8) {
        if (row as usize) < KeyMap::ROWS && (col as usize) < KeyMap::COLS {
            self.0 |= Self::bit(row, col);
        }
    }

    pub fn contains(&self, row: u8, col: u8) -> bool {
        (row as usize) < KeyMap::ROWS
            && (col as usize) < KeyMap::COLS
            && self.0 & Self::bit(row, col) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Closed cells, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        (0..KeyMap::ROWS as u8)
            .flat_map(|row| (0..KeyMap::COLS as u8).map(move |col| (row, col)))
            .filter(|&(row, col)| self.contains(row, col))
    }
}

impl Debug for ScanFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.cells()).finish()
    }
}

/// The step of a matrix sweep that touched the hardware.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScanOp {
    /// Driving column `n` low.
    Strobe(u8),
    /// Reading row `n`.
    Sample(u8),
    /// Driving column `n` back high.
    Restore(u8),
}

impl Display for ScanOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanOp::Strobe(col) => write!(f, "strobe of column {}", col),
            ScanOp::Sample(row) => write!(f, "sample of row {}", row),
            ScanOp::Restore(col) => write!(f, "restore of column {}", col),
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{op} failed: {source}")]
pub struct ScanError {
    pub op: ScanOp,
    #[source]
    pub source: GpioError,
}

/// The `Keypad` trait defines the interface for keypad input devices.
pub trait Keypad: Debug {
    /// Sweeps the whole matrix once.
    fn scan(&mut self) -> Result<ScanFrame, ScanError>;

    /// Gives every line back to the system. Safe to call more than once.
    fn release(&mut self) -> Result<(), GpioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tracks_cells() {
        let frame = ScanFrame::empty().with(1, 3).with(0, 0).with(9, 9);
        assert!(frame.contains(1, 3));
        assert!(frame.contains(0, 0));
        assert!(!frame.contains(3, 1));
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.cells().collect::<Vec<_>>(), vec![(0, 0), (1, 3)]);
        assert_eq!(format!("{:?}", frame), "{(0, 0), (1, 3)}");
    }
}
