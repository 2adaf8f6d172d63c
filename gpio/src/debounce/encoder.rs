//! Counted debouncing of scan frames into edge-triggered button events.
use std::fmt::{Display, Formatter};
use std::time::Duration;
use log::trace;
use crate::debounce::{InputControl, Timestamp};
use crate::keypad::{Button, KeyMap, ScanFrame};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyLevel {
    Up,
    Down,
}

/// Kinds of button events, in the order they are delivered within one tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Release,
    Press,
    Repeat,
}

impl EventKind {
    const DELIVERY_ORDER: [EventKind; 3] = [EventKind::Release, EventKind::Press, EventKind::Repeat];
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ButtonEvent {
    pub kind: EventKind,
    pub button: Button,
    pub timestamp: Timestamp,
}

impl ButtonEvent {
    pub fn new(kind: EventKind, button: Button, timestamp: Timestamp) -> Self {
        ButtonEvent { kind, button, timestamp }
    }

    pub fn is_press_of(&self, button: Button) -> bool {
        self.kind == EventKind::Press && self.button == button
    }
}

impl Display for ButtonEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {} @ {}", self.kind, self.button, self.timestamp)
    }
}

/// Debounce and auto-repeat parameters.
#[derive(Copy, Clone, Debug)]
pub struct DebounceConfig {
    /// Cadence at which the matrix is scanned.
    pub tick_period: Duration,
    /// Consecutive identical samples required to accept a level change.
    pub debounce_samples: u32,
    /// Minimum hold time before the first repeat.
    pub repeat_initial_delay: Duration,
    /// Gap between consecutive repeats.
    pub repeat_interval: Duration,
    /// Which buttons may auto-repeat at all.
    pub repeat_allowed: fn(Button) -> bool,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig {
            tick_period: Duration::from_millis(20),
            debounce_samples: 2,
            repeat_initial_delay: Duration::from_millis(400),
            repeat_interval: Duration::from_millis(120),
            repeat_allowed: Button::repeats_by_default,
        }
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[derive(Copy, Clone, Debug)]
struct RepeatTiming {
    initial_delay: u32,
    interval: u32,
}

/// Debounce state of one logical button.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonState {
    pub stable_level: KeyLevel,
    pub candidate_level: KeyLevel,
    /// Consecutive scans that confirmed `candidate_level`.
    pub samples_in_candidate: u32,
    pub last_change_time: Timestamp,
    pub last_repeat_time: Timestamp,
}

impl Default for ButtonState {
    fn default() -> Self {
        ButtonState {
            stable_level: KeyLevel::Up,
            candidate_level: KeyLevel::Up,
            samples_in_candidate: 0,
            last_change_time: Timestamp::default(),
            last_repeat_time: Timestamp::default(),
        }
    }
}

impl ButtonState {
    /// Feeds one sample. Returns the event to emit for this tick, if any.
    fn advance(
        &mut self,
        observed: KeyLevel,
        now: Timestamp,
        samples_needed: u32,
        repeat: Option<RepeatTiming>,
    ) -> Option<EventKind> {
        if observed == self.stable_level {
            self.candidate_level = observed;
            self.samples_in_candidate = 0;
        } else {
            if observed == self.candidate_level {
                self.samples_in_candidate += 1;
            } else {
                self.candidate_level = observed;
                self.samples_in_candidate = 1;
            }

            if self.samples_in_candidate >= samples_needed {
                self.stable_level = observed;
                self.samples_in_candidate = 0;
                self.last_change_time = now;
                self.last_repeat_time = now;
                return Some(match observed {
                    KeyLevel::Down => EventKind::Press,
                    KeyLevel::Up => EventKind::Release,
                });
            }
        }

        let repeat = repeat?;
        if self.stable_level == KeyLevel::Down
            && now.since(self.last_change_time) >= repeat.initial_delay
            && now.since(self.last_repeat_time) >= repeat.interval
        {
            self.last_repeat_time = now;
            return Some(EventKind::Repeat);
        }

        None
    }
}

/// Turns scan frames into `Press`, `Repeat` and `Release` events.
///
/// Deterministic: the same frames at the same timestamps from the same initial state give
/// the same events. Within one tick, releases come before presses before repeats, and each
/// kind is ordered by [Button::ALL].
#[derive(Clone, Debug)]
pub struct EventEncoder {
    keymap: KeyMap,
    config: DebounceConfig,
    states: [ButtonState; Button::COUNT],
    repeat_enabled: bool,
}

impl EventEncoder {
    pub fn new(keymap: KeyMap, config: DebounceConfig) -> Self {
        EventEncoder {
            keymap,
            config,
            states: [ButtonState::default(); Button::COUNT],
            repeat_enabled: true,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn state(&self, button: Button) -> &ButtonState {
        &self.states[button.index()]
    }

    /// Whether the button is currently debounced as held.
    pub fn is_down(&self, button: Button) -> bool {
        self.state(button).stable_level == KeyLevel::Down
    }

    /// Advances every button by one scan taken at `now`.
    pub fn update(&mut self, frame: &ScanFrame, now: Timestamp) -> Vec<ButtonEvent> {
        let samples_needed = self.config.debounce_samples.max(1);
        let timing = RepeatTiming {
            initial_delay: millis(self.config.repeat_initial_delay),
            interval: millis(self.config.repeat_interval),
        };

        let mut outcome = [None; Button::COUNT];
        for button in Button::ALL {
            let observed = match self.keymap.position_of(button) {
                Some((row, col)) if frame.contains(row, col) => KeyLevel::Down,
                _ => KeyLevel::Up,
            };
            let repeat = (self.repeat_enabled && (self.config.repeat_allowed)(button))
                .then_some(timing);
            outcome[button.index()] =
                self.states[button.index()].advance(observed, now, samples_needed, repeat);
        }

        let mut events = Vec::new();
        for kind in EventKind::DELIVERY_ORDER {
            for button in Button::ALL {
                if outcome[button.index()] == Some(kind) {
                    let event = ButtonEvent::new(kind, button, now);
                    trace!("{}", event);
                    events.push(event);
                }
            }
        }
        events
    }
}

impl InputControl for EventEncoder {
    fn set_repeat_enabled(&mut self, enabled: bool) {
        self.repeat_enabled = enabled;
    }

    fn repeat_enabled(&self) -> bool {
        self.repeat_enabled
    }
}
