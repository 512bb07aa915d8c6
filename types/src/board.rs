//! Board geometry.
//!
//! The main track is a 52-cell loop shared by all colors. Each color enters the
//! track on its start cell, travels 50 further cells to its home-entry cell and
//! then turns off onto a private 6-cell home path.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};

/// Number of cells on the shared main track.
pub const TRACK_LEN: u8 = 52;

/// Number of cells on each color's home path (positions `0..=5`).
pub const HOME_PATH_LEN: u8 = 6;

/// Pieces owned by each color.
pub const PIECES_PER_COLOR: usize = 4;

/// Number of colors at the table.
pub const COLOR_COUNT: usize = 4;

/// Cells a piece walks past its start cell before reaching home entry.
const HOME_ENTRY_OFFSET: u8 = 50;

/// Cells on which no capture can happen: every start cell plus one star cell per quarter.
pub const SAFE_CELLS: [u8; 8] = [0, 8, 13, 21, 26, 34, 39, 47];

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Color {
    Red = 0,
    Green = 1,
    Yellow = 2,
    Blue = 3,
}

impl Color {
    /// Fixed turn order.
    pub const ALL: [Color; COLOR_COUNT] = [Color::Red, Color::Green, Color::Yellow, Color::Blue];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Next color in the rotation (Blue wraps to Red).
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % COLOR_COUNT]
    }

    pub fn start_cell(self) -> u8 {
        (self as u8) * 13
    }

    /// Last main-track cell this color visits before turning onto its home path.
    pub fn home_entry_cell(self) -> u8 {
        (self.start_cell() + HOME_ENTRY_OFFSET) % TRACK_LEN
    }

    /// Forward distance from this color's start cell to `cell`.
    pub fn progress_from_start(self, cell: u8) -> u8 {
        (cell % TRACK_LEN + TRACK_LEN - self.start_cell()) % TRACK_LEN
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Color {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Color::Red),
            1 => Ok(Color::Green),
            2 => Ok(Color::Yellow),
            3 => Ok(Color::Blue),
            _ => Err(()),
        }
    }
}

impl Write for Color {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Color {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        Color::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for Color {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Whether `cell` is one of the capture-free cells.
pub fn is_safe_cell(cell: u8) -> bool {
    SAFE_CELLS.contains(&(cell % TRACK_LEN))
}
