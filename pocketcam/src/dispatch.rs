//! Hands each tick's events to the UI, one at a time.
use std::fmt::Display;
use log::{debug, warn};
use pocketcam_gpio::debounce::{ButtonEvent, InputControl, Timestamp};

/// The single consumer of button events.
pub trait EventHandler {
    type Error: Display;

    fn handle(&mut self, event: &ButtonEvent, input: &mut dyn InputControl) -> Result<(), Self::Error>;

    /// Called once per tick after the events of that tick were handled.
    fn on_tick(&mut self, _now: Timestamp) {}

    /// Called once when the run loop exits.
    fn shutdown(&mut self) {}
}

#[derive(Debug)]
pub struct Dispatcher<H> {
    handler: H,
}

impl<H: EventHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Dispatcher { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Delivers `events` in order. A failing event is logged and skipped.
    ///
    /// Returns how many events failed.
    pub fn dispatch(&mut self, events: &[ButtonEvent], input: &mut dyn InputControl) -> usize {
        let mut failures = 0;
        for event in events {
            debug!("{}", event);
            if let Err(e) = self.handler.handle(event, input) {
                warn!("Handling {} failed: {}", event, e);
                failures += 1;
            }
        }
        failures
    }
}
