//! Conversion between [`MatchState`] and its full-state wire form.

use ludo_types::wire::{FullStatePayload, ParticipantSnapshot, PieceSnapshot};
use ludo_types::{MatchEvent, MatchPhase, MatchState};

use crate::engine::RuleError;

pub fn capture(state: &MatchState, sequence: u32) -> FullStatePayload {
    FullStatePayload {
        participants: state
            .participants
            .iter()
            .map(|participant| ParticipantSnapshot {
                color: participant.color,
                pieces: participant
                    .pieces
                    .iter()
                    .map(|piece| PieceSnapshot {
                        slot: piece.id.slot,
                        location: piece.location,
                    })
                    .collect(),
                finish_rank: participant.finish_rank,
            })
            .collect(),
        current_color: state.current_color(),
        phase: state.phase,
        die_value: state.die_value,
        six_streak: state.six_streak,
        finish_order: state.finish_order.clone(),
        sequence,
    }
}

/// Overwrite `current` field by field with `payload`.
///
/// Participants and pieces absent from the payload keep their local values.
/// The result must satisfy the state invariants; the event log carries over.
pub fn restore(current: &MatchState, payload: &FullStatePayload) -> Result<MatchState, RuleError> {
    if payload.phase == MatchPhase::AnimatingMove {
        return Err(RuleError::InvalidSnapshot(
            "animating phase is local to a peer".to_string(),
        ));
    }
    let mut next = current.clone();
    for snapshot in &payload.participants {
        let participant = next.participant_mut(snapshot.color);
        for piece in &snapshot.pieces {
            let target = participant
                .piece_mut(piece.slot)
                .ok_or(RuleError::InvalidSlot(piece.slot))?;
            target.location = piece.location;
        }
        participant.finish_rank = snapshot.finish_rank;
    }
    next.set_current_color(payload.current_color);
    next.phase = payload.phase;
    next.die_value = payload.die_value;
    next.six_streak = payload.six_streak;
    next.finish_order = payload.finish_order.clone();
    next.validate_invariants()
        .map_err(|err| RuleError::InvalidSnapshot(err.to_string()))?;
    next.log(MatchEvent::SnapshotRestored {
        sequence: payload.sequence,
    });
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludo_types::{Color, PieceLocation};

    #[test]
    fn test_capture_lists_every_piece() {
        let mut state = MatchState::new();
        state.participant_mut(Color::Yellow).pieces[2].location = PieceLocation::HomePath(5);
        let payload = capture(&state, 9);
        assert_eq!(payload.sequence, 9);
        assert_eq!(payload.participants.len(), 4);
        assert!(payload.participants.iter().all(|p| p.pieces.len() == 4));
        assert_eq!(
            payload.participants[Color::Yellow.index()].pieces[2].location,
            PieceLocation::HomePath(5)
        );
    }

    #[test]
    fn test_partial_payload_keeps_unlisted_participants() {
        let mut local = MatchState::new();
        local.participant_mut(Color::Blue).pieces[0].location = PieceLocation::Track(40);

        let mut payload = capture(&MatchState::new(), 2);
        payload.participants.retain(|p| p.color == Color::Red);
        payload.participants[0].pieces[1].location = PieceLocation::Track(3);
        payload.phase = MatchPhase::Rolling;

        let restored = restore(&local, &payload).unwrap();
        assert_eq!(
            restored.participant(Color::Red).pieces[1].location,
            PieceLocation::Track(3)
        );
        assert_eq!(
            restored.participant(Color::Blue).pieces[0].location,
            PieceLocation::Track(40)
        );
    }

    #[test]
    fn test_animating_phase_rejected() {
        let mut payload = capture(&MatchState::new(), 1);
        payload.phase = MatchPhase::AnimatingMove;
        assert!(matches!(
            restore(&MatchState::new(), &payload),
            Err(RuleError::InvalidSnapshot(_))
        ));
    }
}
