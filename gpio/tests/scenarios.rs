//! End-to-end behaviour of the scanner + debouncer on a simulated matrix.
//!
//! Scans happen every 20 ms starting at t = 0. A contact "closed at a, open at b" is seen
//! closed by scans at times t with a < t <= b.

use pocketcam_gpio::debounce::{ButtonEvent, DebounceConfig, EventEncoder, EventKind, InputControl, Timestamp};
use pocketcam_gpio::keypad::{Button, GpioKeypad, KeyMap, Keypad, ScanFrame};
use pocketcam_gpio::sim::{SimGpioDriver, SimHandle};
use pocketcam_gpio::{Gpio, Pin};
use std::collections::HashSet;

const COLS: [Pin; 4] = [19, 13, 6, 5];
const ROWS: [Pin; 4] = [17, 22, 23, 27];
const TICK: u32 = 20;

struct Contact {
    row: usize,
    col: usize,
    closed_at: u32,
    open_at: u32,
}

impl Contact {
    fn button(button: Button, closed_at: u32, open_at: u32) -> Self {
        let (row, col) = KeyMap::camera().position_of(button).unwrap();
        Contact { row: row as usize, col: col as usize, closed_at, open_at }
    }

    fn cell(row: usize, col: usize, closed_at: u32, open_at: u32) -> Self {
        Contact { row, col, closed_at, open_at }
    }

    fn is_closed(&self, t: u32) -> bool {
        self.closed_at < t && t <= self.open_at
    }
}

struct Rig {
    keypad: GpioKeypad,
    sim: SimHandle,
    encoder: EventEncoder,
}

impl Rig {
    fn new() -> Self {
        let (driver, sim) = SimGpioDriver::new(28);
        let gpio = Gpio::new(Box::new(driver)).unwrap();
        let keypad = GpioKeypad::new(gpio, COLS, ROWS, KeyMap::camera())
            .unwrap()
            .with_settle_time(GpioKeypad::MIN_SETTLE_TIME)
            .unwrap();
        let encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
        Rig { keypad, sim, encoder }
    }

    /// Runs ticks from 0 through `until` (inclusive) and collects every event.
    fn run(&mut self, contacts: &[Contact], until: u32) -> Vec<ButtonEvent> {
        let mut events = Vec::new();
        for t in (0..=until).step_by(TICK as usize) {
            self.sim.disconnect_all();
            for c in contacts.iter().filter(|c| c.is_closed(t)) {
                self.sim.connect(ROWS[c.row], COLS[c.col]);
            }
            let frame = self.keypad.scan().unwrap();
            events.extend(self.encoder.update(&frame, Timestamp::from_millis(t)));
        }
        events
    }
}

fn ev(kind: EventKind, button: Button, ms: u32) -> ButtonEvent {
    ButtonEvent::new(kind, button, Timestamp::from_millis(ms))
}

#[test]
fn s1_short_press_without_repeat() {
    let mut rig = Rig::new();
    let events = rig.run(&[Contact::button(Button::Ok, 0, 200)], 400);
    assert_eq!(
        events,
        vec![
            ev(EventKind::Press, Button::Ok, 40),
            ev(EventKind::Release, Button::Ok, 240),
        ]
    );
}

#[test]
fn s2_long_hold_repeats() {
    let mut rig = Rig::new();
    let events = rig.run(&[Contact::button(Button::Up, 0, 1000)], 1200);
    let expected: Vec<_> = [
        (EventKind::Press, 40),
        (EventKind::Repeat, 440),
        (EventKind::Repeat, 560),
        (EventKind::Repeat, 680),
        (EventKind::Repeat, 800),
        (EventKind::Repeat, 920),
        (EventKind::Release, 1040),
    ]
    .into_iter()
    .map(|(kind, ms)| ev(kind, Button::Up, ms))
    .collect();
    assert_eq!(events, expected);
}

#[test]
fn s3_single_scan_glitch_is_ignored() {
    let mut encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
    let (row, col) = KeyMap::camera().position_of(Button::Menu).unwrap();
    let mut events = encoder.update(&ScanFrame::empty().with(row, col), Timestamp::from_millis(0));
    for t in (20..=400).step_by(20) {
        events.extend(encoder.update(&ScanFrame::empty(), Timestamp::from_millis(t)));
    }
    assert!(events.is_empty());
}

#[test]
fn s4_chord_presses_in_alphabet_order() {
    let mut rig = Rig::new();
    let events = rig.run(
        &[
            Contact::button(Button::Right, 0, 100),
            Contact::button(Button::Left, 0, 100),
        ],
        40,
    );
    assert_eq!(
        events,
        vec![
            ev(EventKind::Press, Button::Left, 40),
            ev(EventKind::Press, Button::Right, 40),
        ]
    );
}

#[test]
fn s5_unmapped_cell_never_fires() {
    let mut rig = Rig::new();
    let events = rig.run(&[Contact::cell(1, 0, 0, u32::MAX)], 3000);
    assert!(events.is_empty());
}

#[test]
fn every_unmapped_cell_is_silent() {
    let map = KeyMap::camera();
    let unmapped: Vec<_> = (0..4)
        .flat_map(|row| (0..4).map(move |col| (row, col)))
        .filter(|&(row, col)| !map.is_mapped(row as u8, col as u8))
        .map(|(row, col)| Contact::cell(row, col, 0, u32::MAX))
        .collect();
    assert_eq!(unmapped.len(), 5);
    let mut rig = Rig::new();
    assert!(rig.run(&unmapped, 2000).is_empty());
}

#[test]
fn hold_across_clock_rollover_is_one_hold() {
    let mut encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
    let (row, col) = KeyMap::camera().position_of(Button::Up).unwrap();
    let held = ScanFrame::empty().with(row, col);
    let start = Timestamp::from_millis(u32::MAX - 99);

    let mut events = Vec::new();
    let mut now = start;
    for _ in 0..30 {
        events.extend(encoder.update(&held, now));
        now = now.after(std::time::Duration::from_millis(20));
    }
    events.extend(encoder.update(&ScanFrame::empty(), now));
    now = now.after(std::time::Duration::from_millis(20));
    events.extend(encoder.update(&ScanFrame::empty(), now));

    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Press, EventKind::Repeat, EventKind::Repeat, EventKind::Release]
    );
    // Press at start+20 (before the wrap), first repeat 400 ms later (after it).
    assert_eq!(events[0].timestamp, start.after(std::time::Duration::from_millis(20)));
    assert_eq!(events[1].timestamp.since(events[0].timestamp), 400);
    assert_eq!(events[2].timestamp.since(events[1].timestamp), 120);
}

/// A small deterministic generator for random scan histories.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// A history of frames where each cell flips with probability 1/`flip`.
    fn history(&mut self, len: usize, flip: u64) -> Vec<ScanFrame> {
        let mut closed = [[false; 4]; 4];
        (0..len)
            .map(|_| {
                let mut frame = ScanFrame::empty();
                for (row, cells) in closed.iter_mut().enumerate() {
                    for (col, cell) in cells.iter_mut().enumerate() {
                        if self.next() % flip == 0 {
                            *cell = !*cell;
                        }
                        if *cell {
                            frame.insert(row as u8, col as u8);
                        }
                    }
                }
                frame
            })
            .collect()
    }
}

fn replay(history: &[ScanFrame], encoder: &mut EventEncoder) -> Vec<ButtonEvent> {
    history
        .iter()
        .enumerate()
        .flat_map(|(i, frame)| encoder.update(frame, Timestamp::from_millis(i as u32 * TICK)))
        .collect()
}

#[test]
fn event_streams_follow_press_repeat_release() {
    let mut rng = XorShift(0x9e3779b97f4a7c15);
    for _ in 0..50 {
        let history = rng.history(400, 6);
        let mut encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
        let events = replay(&history, &mut encoder);

        for button in Button::ALL {
            let mut down = false;
            for event in events.iter().filter(|e| e.button == button) {
                match (down, event.kind) {
                    (false, EventKind::Press) => down = true,
                    (true, EventKind::Repeat) => {}
                    (true, EventKind::Release) => down = false,
                    (state, kind) => panic!("{:?} while down={} for {}", kind, state, button),
                }
            }
        }

        let mut seen = HashSet::new();
        for event in &events {
            assert!(seen.insert((event.timestamp, event.button)), "two events for {}", event);
        }
    }
}

#[test]
fn short_glitches_produce_nothing() {
    let config = DebounceConfig { debounce_samples: 3, ..DebounceConfig::default() };
    let map = KeyMap::camera();
    for button in Button::ALL {
        let (row, col) = map.position_of(button).unwrap();
        for glitch_len in 1..3u32 {
            let mut encoder = EventEncoder::new(map.clone(), config);
            let mut events = Vec::new();
            for tick in 0..40u32 {
                let closed = (5..5 + glitch_len).contains(&tick);
                let frame = if closed { ScanFrame::empty().with(row, col) } else { ScanFrame::empty() };
                events.extend(encoder.update(&frame, Timestamp::from_millis(tick * TICK)));
            }
            assert!(events.is_empty(), "{} glitch of {} ticks fired {:?}", button, glitch_len, events);
        }
    }
}

#[test]
fn non_repeating_buttons_never_repeat() {
    let mut rng = XorShift(42);
    for _ in 0..20 {
        let history = rng.history(600, 40);
        let mut encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
        let events = replay(&history, &mut encoder);
        assert!(
            events
                .iter()
                .filter(|e| e.kind == EventKind::Repeat)
                .all(|e| e.button.repeats_by_default())
        );
    }
}

#[test]
fn globally_disabled_repeat_never_repeats() {
    let mut rng = XorShift(7);
    let history = rng.history(600, 40);
    let mut encoder = EventEncoder::new(KeyMap::camera(), DebounceConfig::default());
    encoder.set_repeat_enabled(false);
    let events = replay(&history, &mut encoder);
    assert!(events.iter().all(|e| e.kind != EventKind::Repeat));
}

#[test]
fn replay_is_deterministic() {
    let mut rng = XorShift(1234);
    let history = rng.history(500, 8);
    let first = replay(&history, &mut EventEncoder::new(KeyMap::camera(), DebounceConfig::default()));
    let second = replay(&history, &mut EventEncoder::new(KeyMap::camera(), DebounceConfig::default()));
    assert!(!first.is_empty());
    assert_eq!(format!("{:?}", first), format!("{:?}", second));
}

#[test]
fn unmapped_cells_never_fire_in_random_histories() {
    let mut rng = XorShift(99);
    let map = KeyMap::camera();
    let history = rng.history(500, 5);
    let mut encoder = EventEncoder::new(map.clone(), DebounceConfig::default());
    let mapped_only: Vec<ScanFrame> = history
        .iter()
        .map(|frame| {
            frame
                .cells()
                .filter(|&(row, col)| map.is_mapped(row, col))
                .fold(ScanFrame::empty(), |f, (row, col)| f.with(row, col))
        })
        .collect();
    let with_noise = replay(&history, &mut encoder);
    let without = replay(&mapped_only, &mut EventEncoder::new(map, DebounceConfig::default()));
    assert_eq!(with_noise, without);
}
