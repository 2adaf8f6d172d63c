use std::fmt::{Display, Formatter};
use thiserror::Error;

/// The logical buttons of the camera, in their fixed alphabet order.
///
/// The declaration order is significant: events of the same kind within one tick are
/// delivered in this order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    Ok,
    Menu,
    Plus,
    Minus,
    Delete,
    Videos,
    Record,
}

impl Button {
    pub const COUNT: usize = 11;

    /// Every button, in alphabet order.
    pub const ALL: [Button; Button::COUNT] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Ok,
        Button::Menu,
        Button::Plus,
        Button::Minus,
        Button::Delete,
        Button::Videos,
        Button::Record,
    ];

    /// Position of the button in [Button::ALL].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::Ok => "OK",
            Button::Menu => "MENU",
            Button::Plus => "PLUS",
            Button::Minus => "MINUS",
            Button::Delete => "DELETE",
            Button::Videos => "VIDEOS",
            Button::Record => "RECORD",
        }
    }

    /// Navigation and adjustment buttons auto-repeat while held; the rest do not.
    pub const fn repeats_by_default(self) -> bool {
        matches!(
            self,
            Button::Up | Button::Down | Button::Left | Button::Right | Button::Plus | Button::Minus
        )
    }
}

impl Display for Button {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyMapError {
    #[error("cell ({row}, {col}) is outside the 4x4 matrix")]
    CellOutOfRange { row: u8, col: u8 },
    #[error("cell ({row}, {col}) is mapped more than once")]
    DuplicateCell { row: u8, col: u8 },
    #[error("button {0} is mapped to more than one cell")]
    DuplicateButton(Button),
}

/// An immutable mapping from matrix cells `(row, col)` to logical buttons.
///
/// Cells without a button are ignored by the scanner and never produce events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyMap {
    cells: [[Option<Button>; KeyMap::COLS]; KeyMap::ROWS],
    positions: [Option<(u8, u8)>; Button::COUNT],
}

impl KeyMap {
    pub const ROWS: usize = 4;
    pub const COLS: usize = 4;

    /// Builds a key map from `((row, col), button)` entries.
    pub fn new(entries: &[((u8, u8), Button)]) -> Result<Self, KeyMapError> {
        let mut cells = [[None; Self::COLS]; Self::ROWS];
        let mut positions = [None; Button::COUNT];

        for &((row, col), button) in entries {
            if row as usize >= Self::ROWS || col as usize >= Self::COLS {
                return Err(KeyMapError::CellOutOfRange { row, col });
            }
            let cell = &mut cells[row as usize][col as usize];
            if cell.is_some() {
                return Err(KeyMapError::DuplicateCell { row, col });
            }
            if positions[button.index()].is_some() {
                return Err(KeyMapError::DuplicateButton(button));
            }
            *cell = Some(button);
            positions[button.index()] = Some((row, col));
        }

        Ok(KeyMap { cells, positions })
    }

    /// The wiring of the camera's keypad. Cells (1,0), (2,0), (3,0), (3,1) and (3,2)
    /// are not assigned.
    pub fn camera() -> Self {
        use Button::*;

        const ENTRIES: [((u8, u8), Button); Button::COUNT] = [
            ((0, 3), Up),
            ((0, 2), Minus),
            ((0, 1), Plus),
            ((0, 0), Menu),
            ((1, 3), Left),
            ((1, 2), Ok),
            ((1, 1), Right),
            ((2, 3), Down),
            ((2, 2), Delete),
            ((2, 1), Videos),
            ((3, 3), Record),
        ];

        let mut cells = [[None; Self::COLS]; Self::ROWS];
        let mut positions = [None; Button::COUNT];
        for ((row, col), button) in ENTRIES {
            cells[row as usize][col as usize] = Some(button);
            positions[button.index()] = Some((row, col));
        }
        KeyMap { cells, positions }
    }

    /// Converts a position (row, column) to the button wired there, if any.
    pub fn button_at(&self, row: u8, col: u8) -> Option<Button> {
        self.cells.get(row as usize)?.get(col as usize).copied().flatten()
    }

    /// The cell a button is wired to, if it is mapped at all.
    pub fn position_of(&self, button: Button) -> Option<(u8, u8)> {
        self.positions[button.index()]
    }

    pub fn is_mapped(&self, row: u8, col: u8) -> bool {
        self.button_at(row, col).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_order_matches_index() {
        for (i, button) in Button::ALL.iter().enumerate() {
            assert_eq!(button.index(), i);
        }
        assert!(Button::Left < Button::Right);
    }

    #[test]
    fn camera_map_assigns_eleven_cells() {
        let map = KeyMap::camera();
        let mapped = (0..4)
            .flat_map(|row| (0..4).map(move |col| (row, col)))
            .filter(|&(row, col)| map.is_mapped(row, col))
            .count();
        assert_eq!(mapped, 11);
        for (row, col) in [(1, 0), (2, 0), (3, 0), (3, 1), (3, 2)] {
            assert_eq!(map.button_at(row, col), None);
        }
        assert_eq!(map.button_at(0, 3), Some(Button::Up));
        assert_eq!(map.button_at(3, 3), Some(Button::Record));
        assert_eq!(map.position_of(Button::Ok), Some((1, 2)));
    }

    #[test]
    fn camera_map_is_a_valid_map() {
        let map = KeyMap::camera();
        let entries: Vec<_> = Button::ALL
            .iter()
            .map(|&b| (map.position_of(b).unwrap(), b))
            .collect();
        assert_eq!(KeyMap::new(&entries), Ok(map));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_eq!(
            KeyMap::new(&[((4, 0), Button::Up)]),
            Err(KeyMapError::CellOutOfRange { row: 4, col: 0 })
        );
        assert_eq!(
            KeyMap::new(&[((0, 0), Button::Up), ((0, 0), Button::Down)]),
            Err(KeyMapError::DuplicateCell { row: 0, col: 0 })
        );
        assert_eq!(
            KeyMap::new(&[((0, 0), Button::Up), ((0, 1), Button::Up)]),
            Err(KeyMapError::DuplicateButton(Button::Up))
        );
    }

    #[test]
    fn out_of_range_lookup_is_none() {
        assert_eq!(KeyMap::camera().button_at(7, 1), None);
    }
}
