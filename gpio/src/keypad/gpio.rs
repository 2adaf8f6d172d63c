use std::fmt::{Debug, Formatter};
use std::hint::spin_loop;
use std::time::{Duration, Instant};
use crate::{Gpio, GpioError, GpioLevel, GpioResult, Pin};
use crate::keypad::{KeyMap, Keypad, ScanError, ScanFrame, ScanOp};

/// The `GpioKeypad` struct represents a diode-less 4x4 key matrix wired to GPIO lines.
///
/// Columns are outputs idling high, rows are inputs with pull-ups. A column is selected by
/// driving it low; a row then reads low iff the key at `(row, column)` is closed.
///
/// Three keys closing the corners of a rectangle make the fourth corner read closed too
/// (ghosting). This is not detected.
pub struct GpioKeypad {
    gpio: Gpio,
    cols: [Pin; 4],
    rows: [Pin; 4],
    keymap: KeyMap,
    settle_time: Duration,
}

impl Debug for GpioKeypad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypad({:?}, cols {:?}, rows {:?})", self.gpio, self.cols, self.rows)
    }
}

impl GpioKeypad {
    pub const MIN_SETTLE_TIME: Duration = Duration::from_micros(500);
    pub const MAX_SETTLE_TIME: Duration = Duration::from_millis(2);
    pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(1);

    /// Takes ownership of `gpio` and configures the column and row lines.
    ///
    /// If any line fails to configure, everything configured so far is released (by
    /// dropping `gpio`) before the error is returned.
    pub fn new(mut gpio: Gpio, cols: [Pin; 4], rows: [Pin; 4], keymap: KeyMap) -> GpioResult<Self> {
        for &col in &cols {
            gpio.configure_output(col, GpioLevel::High)?;
        }
        for &row in &rows {
            gpio.configure_input_pullup(row)?;
        }

        Ok(GpioKeypad {
            gpio,
            cols,
            rows,
            keymap,
            settle_time: Self::DEFAULT_SETTLE_TIME,
        })
    }

    /// Sets how long to wait between strobing a column and sampling the rows.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if outside 500 µs ..= 2 ms.
    pub fn with_settle_time(mut self, settle_time: Duration) -> GpioResult<Self> {
        if !(Self::MIN_SETTLE_TIME..=Self::MAX_SETTLE_TIME).contains(&settle_time) {
            return Err(GpioError::InvalidArgument);
        }
        self.settle_time = settle_time;
        Ok(self)
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    fn settle(&self) {
        let start = Instant::now();
        while start.elapsed() < self.settle_time {
            spin_loop();
        }
    }

    fn sweep_column(&mut self, col: u8, frame: &mut ScanFrame) -> Result<(), ScanError> {
        let col_pin = self.cols[col as usize];
        self.gpio
            .write(col_pin, GpioLevel::Low)
            .map_err(|source| ScanError { op: ScanOp::Strobe(col), source })?;

        self.settle();

        for (row, &row_pin) in self.rows.iter().enumerate() {
            let row = row as u8;
            let level = self
                .gpio
                .read(row_pin)
                .map_err(|source| ScanError { op: ScanOp::Sample(row), source })?;
            if level.is_low() && self.keymap.is_mapped(row, col) {
                frame.insert(row, col);
            }
        }

        Ok(())
    }
}

impl Keypad for GpioKeypad {
    fn scan(&mut self) -> Result<ScanFrame, ScanError> {
        let mut frame = ScanFrame::empty();

        for col in 0..self.cols.len() as u8 {
            let swept = self.sweep_column(col, &mut frame);
            // The column goes back high even if the sweep failed halfway.
            let restored = self
                .gpio
                .write(self.cols[col as usize], GpioLevel::High)
                .map_err(|source| ScanError { op: ScanOp::Restore(col), source });
            swept?;
            restored?;
        }

        Ok(frame)
    }

    fn release(&mut self) -> Result<(), GpioError> {
        self.gpio.release_all()
    }
}
