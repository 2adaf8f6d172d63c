//! The fixed-cadence scan loop.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Instant;
use log::{debug, error, info, warn};
use thiserror::Error;
use pocketcam_gpio::debounce::{EventEncoder, Timestamp};
use pocketcam_gpio::keypad::{Keypad, ScanError, ScanOp};
use crate::dispatch::{Dispatcher, EventHandler};

/// Consecutive failures of the same scan step that end the loop.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("keypad failed {count} times in a row: {source}")]
    Hardware { count: u32, #[source] source: ScanError },
}

/// Milliseconds since the loop was created, on the wrapping [Timestamp] scale.
#[derive(Copy, Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock { origin: Instant::now() }
    }

    pub fn now(&self) -> Timestamp {
        // Truncation is the wrap.
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u32)
    }
}

pub struct Runner<K, H> {
    keypad: K,
    encoder: EventEncoder,
    dispatcher: Dispatcher<H>,
    clock: MonotonicClock,
    shutdown: Arc<AtomicBool>,
    failures: Option<(ScanOp, u32)>,
}

impl<K: Keypad, H: EventHandler> Runner<K, H> {
    pub fn new(keypad: K, encoder: EventEncoder, handler: H, shutdown: Arc<AtomicBool>) -> Self {
        Runner {
            keypad,
            encoder,
            dispatcher: Dispatcher::new(handler),
            clock: MonotonicClock::new(),
            shutdown,
            failures: None,
        }
    }

    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    pub fn encoder(&self) -> &EventEncoder {
        &self.encoder
    }

    /// One scan, debounce and dispatch, as of `now`.
    ///
    /// A failed scan skips the tick. The same step failing
    /// [MAX_CONSECUTIVE_FAILURES] times in a row is fatal.
    pub fn tick(&mut self, now: Timestamp) -> Result<(), RunError> {
        match self.keypad.scan() {
            Ok(frame) => {
                if self.failures.take().is_some() {
                    debug!("Keypad recovered at {}", now);
                }
                let events = self.encoder.update(&frame, now);
                self.dispatcher.dispatch(&events, &mut self.encoder);
            }
            Err(e) => {
                let count = match self.failures {
                    Some((op, n)) if op == e.op => n + 1,
                    _ => 1,
                };
                self.failures = Some((e.op, count));
                if count >= MAX_CONSECUTIVE_FAILURES {
                    error!("Keypad {} ({} in a row)", e, count);
                    return Err(RunError::Hardware { count, source: e });
                }
                warn!("Skipping tick at {}: {}", now, e);
            }
        }
        self.dispatcher.handler_mut().on_tick(now);
        Ok(())
    }

    /// Ticks until the shutdown flag is raised or the keypad gives up.
    ///
    /// The handler is shut down and the keypad lines are released on every exit.
    pub fn run(&mut self) -> Result<(), RunError> {
        let period = self.encoder.config().tick_period;
        info!("Scanning every {:?}", period);

        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested.");
                break Ok(());
            }
            let start = Instant::now();
            if let Err(e) = self.tick(self.clock.now()) {
                break Err(e);
            }
            sleep(period.saturating_sub(start.elapsed()));
        };

        self.dispatcher.handler_mut().shutdown();
        if let Err(e) = self.keypad.release() {
            warn!("Failed to release keypad lines: {}", e);
        }
        result
    }
}
