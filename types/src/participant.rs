use crate::board::{Color, PIECES_PER_COLOR};
use crate::piece::{Piece, PieceId, PieceLocation};

/// One color's four pieces plus its finishing rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub color: Color,
    pub pieces: [Piece; PIECES_PER_COLOR],
    /// 1-based place, assigned once when the fourth piece finishes.
    pub finish_rank: Option<u8>,
}

impl Participant {
    pub fn new(color: Color) -> Self {
        let pieces = std::array::from_fn(|slot| Piece::new(PieceId { color, slot: slot as u8 }));
        Self {
            color,
            pieces,
            finish_rank: None,
        }
    }

    pub fn piece(&self, slot: u8) -> Option<&Piece> {
        self.pieces.get(slot as usize)
    }

    pub fn piece_mut(&mut self, slot: u8) -> Option<&mut Piece> {
        self.pieces.get_mut(slot as usize)
    }

    pub fn pieces_finished(&self) -> usize {
        self.pieces.iter().filter(|p| p.location.is_finished()).count()
    }

    pub fn has_finished_all(&self) -> bool {
        self.pieces_finished() == PIECES_PER_COLOR
    }

    pub fn can_move_any(&self, die: u8) -> bool {
        self.pieces.iter().any(|p| p.can_move(die))
    }

    /// Slots with a legal move for `die`, in slot order.
    pub fn movable_slots(&self, die: u8) -> Vec<u8> {
        self.pieces
            .iter()
            .filter(|p| p.can_move(die))
            .map(|p| p.id.slot)
            .collect()
    }

    /// Slots of this color's pieces standing on main-track `cell`.
    pub fn slots_on_cell(&self, cell: u8) -> Vec<u8> {
        self.pieces
            .iter()
            .filter(|p| p.location == PieceLocation::Track(cell))
            .map(|p| p.id.slot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_has_four_pieces_in_yard() {
        let participant = Participant::new(Color::Yellow);
        assert_eq!(participant.pieces.len(), 4);
        for (slot, piece) in participant.pieces.iter().enumerate() {
            assert_eq!(piece.id, PieceId { color: Color::Yellow, slot: slot as u8 });
            assert!(piece.location.is_in_yard());
        }
        assert_eq!(participant.finish_rank, None);
        assert!(participant.piece(4).is_none());
    }

    #[test]
    fn test_movable_slots_and_cell_lookup() {
        let mut participant = Participant::new(Color::Red);
        participant.pieces[1].location = PieceLocation::Track(10);
        participant.pieces[3].location = PieceLocation::Track(10);
        assert_eq!(participant.movable_slots(3), vec![1, 3]);
        assert_eq!(participant.movable_slots(6), vec![0, 1, 2, 3]);
        assert_eq!(participant.slots_on_cell(10), vec![1, 3]);
        assert!(participant.slots_on_cell(11).is_empty());
    }

    #[test]
    fn test_has_finished_all() {
        let mut participant = Participant::new(Color::Blue);
        for piece in participant.pieces.iter_mut().take(3) {
            piece.location = PieceLocation::Finished;
        }
        assert!(!participant.has_finished_all());
        participant.pieces[3].location = PieceLocation::Finished;
        assert!(participant.has_finished_all());
        assert!(!participant.can_move_any(6));
    }
}
