//! Move choice for automated participants.

use ludo_types::{is_safe_cell, Color, MatchState, MAX_DIE_VALUE};

use crate::engine::capture_target;

/// Ranking of a candidate move. Fields compare in declaration order; larger wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MoveScore {
    captures: bool,
    leaves_yard: bool,
    lands_safe: bool,
    progress: u16,
}

/// Slot `color` should move with `die`, or `None` if nothing can move.
///
/// Equal scores keep the lowest slot.
pub fn suggest_move(state: &MatchState, color: Color, die: u8) -> Option<u8> {
    let mut best: Option<(MoveScore, u8)> = None;
    for piece in &state.participant(color).pieces {
        let Some(to) = piece.destination(die) else {
            continue;
        };
        let landing = to.track_cell();
        let score = MoveScore {
            captures: landing
                .and_then(|cell| capture_target(state, color, cell))
                .is_some(),
            leaves_yard: piece.location.is_in_yard() && die == MAX_DIE_VALUE,
            lands_safe: landing.is_some_and(is_safe_cell),
            progress: piece.progress(),
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, piece.id.slot));
        }
    }
    best.map(|(_, slot)| slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludo_types::PieceLocation;

    #[test]
    fn test_nothing_movable() {
        let state = MatchState::new();
        assert_eq!(suggest_move(&state, Color::Blue, 3), None);
    }

    #[test]
    fn test_ties_keep_lowest_slot() {
        let state = MatchState::new();
        assert_eq!(suggest_move(&state, Color::Yellow, 6), Some(0));
    }

    #[test]
    fn test_stack_is_not_a_capture() {
        let mut state = MatchState::new();
        state.participant_mut(Color::Red).pieces[0].location = PieceLocation::Track(6);
        state.participant_mut(Color::Red).pieces[1].location = PieceLocation::Track(40);
        for slot in 0..2 {
            state.participant_mut(Color::Blue).pieces[slot].location = PieceLocation::Track(10);
        }
        // Without a capture, progress decides.
        assert_eq!(suggest_move(&state, Color::Red, 4), Some(1));
    }
}
