use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};

use crate::board::{Color, HOME_PATH_LEN, PIECES_PER_COLOR, TRACK_LEN};

/// Highest die face.
pub const MAX_DIE_VALUE: u8 = 6;

/// Forward distance from a start cell to the same color's home-entry cell.
const TRACK_STEPS_TO_HOME_ENTRY: u8 = 50;

/// Where a piece currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceLocation {
    Yard,
    /// Main-track cell, `0..=51`.
    Track(u8),
    /// Home-path cell, `0..=5`.
    HomePath(u8),
    Finished,
}

impl PieceLocation {
    pub fn is_in_yard(&self) -> bool {
        matches!(self, PieceLocation::Yard)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, PieceLocation::Finished)
    }

    pub fn track_cell(&self) -> Option<u8> {
        match self {
            PieceLocation::Track(cell) => Some(*cell),
            _ => None,
        }
    }

    /// Map a home-path index to a location; one step past the last cell finishes.
    fn home_or_finished(index: u8) -> Option<Self> {
        match index {
            i if i < HOME_PATH_LEN => Some(PieceLocation::HomePath(i)),
            i if i == HOME_PATH_LEN => Some(PieceLocation::Finished),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            PieceLocation::Yard => 0,
            PieceLocation::Track(_) => 1,
            PieceLocation::HomePath(_) => 2,
            PieceLocation::Finished => 3,
        }
    }
}

impl Write for PieceLocation {
    fn write(&self, writer: &mut impl BufMut) {
        self.tag().write(writer);
        match self {
            PieceLocation::Track(cell) => cell.write(writer),
            PieceLocation::HomePath(index) => index.write(writer),
            PieceLocation::Yard | PieceLocation::Finished => {}
        }
    }
}

impl Read for PieceLocation {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let tag = u8::read(reader)?;
        match tag {
            0 => Ok(PieceLocation::Yard),
            1 => {
                let cell = u8::read(reader)?;
                if cell >= TRACK_LEN {
                    return Err(Error::Invalid("PieceLocation", "track cell out of range"));
                }
                Ok(PieceLocation::Track(cell))
            }
            2 => {
                let index = u8::read(reader)?;
                if index >= HOME_PATH_LEN {
                    return Err(Error::Invalid("PieceLocation", "home path index out of range"));
                }
                Ok(PieceLocation::HomePath(index))
            }
            3 => Ok(PieceLocation::Finished),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for PieceLocation {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                PieceLocation::Track(_) | PieceLocation::HomePath(_) => u8::SIZE,
                PieceLocation::Yard | PieceLocation::Finished => 0,
            }
    }
}

/// Natural key of a piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceId {
    pub color: Color,
    pub slot: u8,
}

impl PieceId {
    pub fn new(color: Color, slot: u8) -> Option<Self> {
        ((slot as usize) < PIECES_PER_COLOR).then_some(Self { color, slot })
    }
}

impl Write for PieceId {
    fn write(&self, writer: &mut impl BufMut) {
        self.color.write(writer);
        self.slot.write(writer);
    }
}

impl Read for PieceId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let color = Color::read(reader)?;
        let slot = u8::read(reader)?;
        PieceId::new(color, slot).ok_or(Error::Invalid("PieceId", "slot out of range"))
    }
}

impl EncodeSize for PieceId {
    fn encode_size(&self) -> usize {
        self.color.encode_size() + self.slot.encode_size()
    }
}

/// Result of a successful [`Piece::move_by`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveTarget {
    pub from: PieceLocation,
    pub to: PieceLocation,
}

impl MoveTarget {
    /// Main-track cell the piece landed on, the only case where a capture is possible.
    pub fn landing_cell(&self) -> Option<u8> {
        self.to.track_cell()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Piece {
    pub id: PieceId,
    pub location: PieceLocation,
}

impl Piece {
    pub fn new(id: PieceId) -> Self {
        Self {
            id,
            location: PieceLocation::Yard,
        }
    }

    pub fn color(&self) -> Color {
        self.id.color
    }

    /// Location the piece would reach with `die`, or `None` if that move is illegal.
    pub fn destination(&self, die: u8) -> Option<PieceLocation> {
        if die == 0 || die > MAX_DIE_VALUE {
            return None;
        }
        let color = self.color();
        match self.location {
            PieceLocation::Yard => (die == MAX_DIE_VALUE).then(|| PieceLocation::Track(color.start_cell())),
            PieceLocation::Track(cell) => {
                let travelled = color.progress_from_start(cell);
                let to_entry = TRACK_STEPS_TO_HOME_ENTRY.saturating_sub(travelled);
                if die <= to_entry {
                    Some(PieceLocation::Track((cell % TRACK_LEN + die) % TRACK_LEN))
                } else {
                    PieceLocation::home_or_finished(die - to_entry - 1)
                }
            }
            PieceLocation::HomePath(index) => PieceLocation::home_or_finished(index + die),
            PieceLocation::Finished => None,
        }
    }

    pub fn can_move(&self, die: u8) -> bool {
        self.destination(die).is_some()
    }

    /// Apply the move for `die`. Returns `None` and leaves the piece untouched when illegal.
    pub fn move_by(&mut self, die: u8) -> Option<MoveTarget> {
        let to = self.destination(die)?;
        let from = self.location;
        self.location = to;
        Some(MoveTarget { from, to })
    }

    pub fn reset_to_yard(&mut self) {
        self.location = PieceLocation::Yard;
    }

    /// Ordering key for "furthest along": yard lowest, home path and finished above any track cell.
    pub fn progress(&self) -> u16 {
        match self.location {
            PieceLocation::Yard => 0,
            PieceLocation::Track(cell) => 1 + self.color().progress_from_start(cell) as u16,
            PieceLocation::HomePath(index) => 100 + index as u16,
            PieceLocation::Finished => 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{DecodeExt, Encode};
    use proptest::prelude::*;

    fn piece_at(color: Color, location: PieceLocation) -> Piece {
        Piece {
            id: PieceId { color, slot: 0 },
            location,
        }
    }

    #[test]
    fn test_yard_piece_moves_only_on_six() {
        let piece = piece_at(Color::Green, PieceLocation::Yard);
        for die in 1..=5 {
            assert!(!piece.can_move(die));
        }
        assert_eq!(piece.destination(6), Some(PieceLocation::Track(13)));
    }

    #[test]
    fn test_track_move_wraps_past_cell_51() {
        let mut piece = piece_at(Color::Green, PieceLocation::Track(50));
        let target = piece.move_by(4).unwrap();
        assert_eq!(target.from, PieceLocation::Track(50));
        assert_eq!(target.to, PieceLocation::Track(2));
        assert_eq!(target.landing_cell(), Some(2));
    }

    #[test]
    fn test_track_move_turns_onto_home_path() {
        // Red home entry is cell 50.
        let piece = piece_at(Color::Red, PieceLocation::Track(48));
        assert_eq!(piece.destination(2), Some(PieceLocation::Track(50)));
        assert_eq!(piece.destination(3), Some(PieceLocation::HomePath(0)));
        assert_eq!(piece.destination(6), Some(PieceLocation::HomePath(3)));

        let at_entry = piece_at(Color::Red, PieceLocation::Track(50));
        assert_eq!(at_entry.destination(6), Some(PieceLocation::HomePath(5)));
    }

    #[test]
    fn test_home_path_requires_exact_roll_to_finish() {
        let piece = piece_at(Color::Blue, PieceLocation::HomePath(3));
        assert_eq!(piece.destination(1), Some(PieceLocation::HomePath(4)));
        assert_eq!(piece.destination(2), Some(PieceLocation::HomePath(5)));
        assert_eq!(piece.destination(3), Some(PieceLocation::Finished));
        assert_eq!(piece.destination(4), None);

        let last = piece_at(Color::Blue, PieceLocation::HomePath(5));
        assert_eq!(last.destination(1), Some(PieceLocation::Finished));
        assert!(!last.can_move(2));
    }

    #[test]
    fn test_finished_piece_never_moves() {
        let mut piece = piece_at(Color::Yellow, PieceLocation::Finished);
        for die in 1..=6 {
            assert!(piece.move_by(die).is_none());
        }
        assert_eq!(piece.location, PieceLocation::Finished);
    }

    #[test]
    fn test_illegal_move_leaves_piece_untouched() {
        let mut piece = piece_at(Color::Red, PieceLocation::HomePath(4));
        assert!(piece.move_by(5).is_none());
        assert_eq!(piece.location, PieceLocation::HomePath(4));
        assert!(piece.move_by(0).is_none());
        assert!(piece.move_by(7).is_none());
    }

    #[test]
    fn test_reset_to_yard() {
        let mut piece = piece_at(Color::Red, PieceLocation::Track(17));
        piece.reset_to_yard();
        assert!(piece.location.is_in_yard());
    }

    #[test]
    fn test_progress_ranks_home_path_above_track() {
        let far = piece_at(Color::Red, PieceLocation::Track(50));
        let home = piece_at(Color::Red, PieceLocation::HomePath(0));
        let yard = piece_at(Color::Red, PieceLocation::Yard);
        assert!(home.progress() > far.progress());
        assert!(far.progress() > yard.progress());
    }

    #[test]
    fn test_location_roundtrip_boundaries() {
        for location in [
            PieceLocation::Yard,
            PieceLocation::Track(0),
            PieceLocation::Track(51),
            PieceLocation::HomePath(0),
            PieceLocation::HomePath(5),
            PieceLocation::Finished,
        ] {
            let encoded = location.encode();
            assert_eq!(encoded.len(), location.encode_size());
            let decoded = PieceLocation::decode(encoded.as_ref()).unwrap();
            assert_eq!(decoded, location);
        }
    }

    #[test]
    fn test_location_rejects_out_of_range() {
        assert!(PieceLocation::decode(&[1u8, 52][..]).is_err());
        assert!(PieceLocation::decode(&[2u8, 6][..]).is_err());
        assert!(matches!(
            PieceLocation::decode(&[9u8][..]),
            Err(Error::InvalidEnum(9))
        ));
        assert!(PieceLocation::decode(&[1u8][..]).is_err());
    }

    #[test]
    fn test_piece_id_rejects_slot_out_of_range() {
        assert!(PieceId::new(Color::Red, 4).is_none());
        assert!(PieceId::decode(&[0u8, 4][..]).is_err());
    }

    fn color_strategy() -> impl Strategy<Value = Color> {
        (0usize..4).prop_map(|i| Color::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_track_move_lands_mod_52_or_home(color in color_strategy(), travelled in 0u8..=50, die in 1u8..=6) {
            let cell = (color.start_cell() + travelled) % TRACK_LEN;
            let mut piece = piece_at(color, PieceLocation::Track(cell));
            if let Some(target) = piece.move_by(die) {
                if travelled + die <= 50 {
                    prop_assert_eq!(target.to, PieceLocation::Track((cell + die) % TRACK_LEN));
                } else {
                    match target.to {
                        PieceLocation::HomePath(index) => prop_assert!(index <= 5),
                        PieceLocation::Finished => {}
                        other => prop_assert!(false, "unexpected destination {:?}", other),
                    }
                }
            }
        }

        #[test]
        fn prop_location_roundtrip(tag in 0u8..4, position in 0u8..52) {
            let location = match tag {
                0 => PieceLocation::Yard,
                1 => PieceLocation::Track(position),
                2 => PieceLocation::HomePath(position % HOME_PATH_LEN),
                _ => PieceLocation::Finished,
            };
            let decoded = PieceLocation::decode(location.encode().as_ref()).unwrap();
            prop_assert_eq!(decoded, location);
        }
    }
}
