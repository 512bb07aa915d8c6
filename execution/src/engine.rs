//! Turn state machine.
//!
//! [`RuleEngine`] owns a [`MatchState`] and is the only code that mutates it.
//! Every operation either completes fully or returns a [`RuleError`] and leaves
//! the state untouched.
//!
//! ## Phases
//!
//! `WaitingToStart -> Rolling -> SelectingPiece -> (AnimatingMove) -> Rolling | GameOver`
//!
//! `AnimatingMove` is only entered when [`EngineConfig::hold_for_animation`] is set.
//! The move itself is applied immediately; the turn resolution (bonus roll,
//! advance, game over) is parked until [`RuleEngine::complete_move`].

use ludo_types::wire::FullStatePayload;
use ludo_types::{
    is_safe_cell, Color, MatchEvent, MatchPhase, MatchState, PieceId, PieceLocation,
    MAX_DIE_VALUE,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::heuristic;
use crate::snapshot;

/// Consecutive sixes that void a turn.
pub const MAX_SIX_STREAK: u8 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Park turn resolution in `AnimatingMove` until the caller releases it.
    pub hold_for_animation: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("wrong phase (expected={expected:?}, actual={actual:?})")]
    WrongPhase {
        expected: MatchPhase,
        actual: MatchPhase,
    },
    #[error("not {got}'s turn (current={current})")]
    NotYourTurn { current: Color, got: Color },
    #[error("invalid die value: {0}")]
    InvalidDieValue(u8),
    #[error("invalid slot: {0}")]
    InvalidSlot(u8),
    #[error("illegal move (color={color}, slot={slot}, die={die})")]
    IllegalMove { color: Color, slot: u8, die: u8 },
    #[error("no pending roll")]
    NoPendingRoll,
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// What happens after a roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollNext {
    /// At least one piece can move; the roller must pick one.
    SelectPiece,
    /// Nothing could move with the value; `next` now acts.
    Passed { next: Color },
    /// Third six in a row; `next` now acts.
    Voided { next: Color },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollOutcome {
    pub color: Color,
    pub value: u8,
    pub next: RollNext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub color: Color,
    pub slot: u8,
    pub from: PieceLocation,
    pub to: PieceLocation,
    pub captured: Option<PieceId>,
    pub bonus_roll: bool,
    pub finished_piece: bool,
    /// Rank assigned by this move, if it brought the last piece home.
    pub finish_rank: Option<u8>,
    pub game_over: bool,
    pub winner: Option<Color>,
    /// Color to act once the move is resolved.
    pub next_color: Color,
    /// Resolution is waiting on [`RuleEngine::complete_move`].
    pub parked: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TurnResolution {
    GameOver { winner: Option<Color> },
    Bonus { color: Color },
    Advance { next: Color },
}

impl TurnResolution {
    fn next_color(&self, mover: Color) -> Color {
        match self {
            TurnResolution::GameOver { .. } => mover,
            TurnResolution::Bonus { color } => *color,
            TurnResolution::Advance { next } => *next,
        }
    }
}

/// The lone opposing piece a move onto `cell` would capture.
///
/// Safe cells never capture, and two or more opposing pieces on the cell are immune.
pub(crate) fn capture_target(state: &MatchState, mover: Color, cell: u8) -> Option<PieceId> {
    if is_safe_cell(cell) {
        return None;
    }
    match state.opponents_on_cell(mover, cell).as_slice() {
        [(color, slots)] if slots.len() == 1 => PieceId::new(*color, slots[0]),
        _ => None,
    }
}

/// Hand the turn to `next` and reset per-turn fields.
fn pass_turn_to(state: &mut MatchState, next: Color) {
    state.set_current_color(next);
    state.six_streak = 0;
    state.die_value = None;
    state.phase = MatchPhase::Rolling;
}

pub(crate) fn apply_resolution(state: &mut MatchState, resolution: TurnResolution) {
    match resolution {
        TurnResolution::GameOver { winner } => {
            state.die_value = None;
            state.phase = MatchPhase::GameOver;
            state.log(MatchEvent::GameOver { winner });
        }
        TurnResolution::Bonus { color } => {
            state.set_current_color(color);
            state.die_value = None;
            state.phase = MatchPhase::Rolling;
            state.log(MatchEvent::BonusRoll { color });
        }
        TurnResolution::Advance { next } => pass_turn_to(state, next),
    }
}

pub struct RuleEngine {
    state: MatchState,
    config: EngineConfig,
    rng: StdRng,
    parked: Option<TurnResolution>,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_parts(config, MatchState::new(), StdRng::from_entropy())
    }

    /// Engine whose die sequence is fully determined by `seed`.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self::from_parts(config, MatchState::new(), StdRng::seed_from_u64(seed))
    }

    /// Resume from an existing state.
    pub fn from_state(config: EngineConfig, state: MatchState, seed: u64) -> Self {
        Self::from_parts(config, state, StdRng::seed_from_u64(seed))
    }

    fn from_parts(config: EngineConfig, state: MatchState, rng: StdRng) -> Self {
        Self {
            state,
            config,
            rng,
            parked: None,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase
    }

    pub fn current_color(&self) -> Color {
        self.state.current_color()
    }

    pub fn is_game_over(&self) -> bool {
        self.state.phase == MatchPhase::GameOver
    }

    fn expect_phase(&self, expected: MatchPhase) -> Result<(), RuleError> {
        if self.state.phase != expected {
            return Err(RuleError::WrongPhase {
                expected,
                actual: self.state.phase,
            });
        }
        Ok(())
    }

    fn expect_turn(&self, color: Color) -> Result<(), RuleError> {
        let current = self.state.current_color();
        if current != color {
            return Err(RuleError::NotYourTurn { current, got: color });
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), RuleError> {
        self.expect_phase(MatchPhase::WaitingToStart)?;
        pass_turn_to(&mut self.state, Color::Red);
        self.state.log(MatchEvent::Started);
        info!("match started");
        Ok(())
    }

    /// Draw a die value from the engine RNG and apply it.
    pub fn roll(&mut self) -> Result<RollOutcome, RuleError> {
        self.expect_phase(MatchPhase::Rolling)?;
        let value = self.rng.gen_range(1..=MAX_DIE_VALUE);
        self.apply_roll(value)
    }

    /// Apply a known die value for the current participant.
    pub fn apply_roll(&mut self, value: u8) -> Result<RollOutcome, RuleError> {
        self.expect_phase(MatchPhase::Rolling)?;
        if value == 0 || value > MAX_DIE_VALUE {
            return Err(RuleError::InvalidDieValue(value));
        }
        let color = self.state.current_color();
        self.state.log(MatchEvent::Rolled { color, value });
        if value == MAX_DIE_VALUE {
            self.state.six_streak = self.state.six_streak.saturating_add(1);
        } else {
            self.state.six_streak = 0;
        }

        if self.state.six_streak >= MAX_SIX_STREAK {
            debug!(?color, "third consecutive six, turn voided");
            self.state.log(MatchEvent::TurnVoided { color });
            let next = self.advance_from(color);
            return Ok(RollOutcome {
                color,
                value,
                next: RollNext::Voided { next },
            });
        }

        if self.state.current_participant().can_move_any(value) {
            self.state.die_value = Some(value);
            self.state.phase = MatchPhase::SelectingPiece;
            return Ok(RollOutcome {
                color,
                value,
                next: RollNext::SelectPiece,
            });
        }

        debug!(?color, value, "no legal move, turn passes");
        self.state.log(MatchEvent::TurnPassed { color, value });
        let next = self.advance_from(color);
        Ok(RollOutcome {
            color,
            value,
            next: RollNext::Passed { next },
        })
    }

    fn advance_from(&mut self, color: Color) -> Color {
        let next = self.state.next_unfinished_after(color).unwrap_or(color);
        pass_turn_to(&mut self.state, next);
        next
    }

    /// Move the current participant's piece in `slot` by the pending die value.
    pub fn move_piece(&mut self, slot: u8) -> Result<MoveOutcome, RuleError> {
        self.expect_phase(MatchPhase::SelectingPiece)?;
        let die = self.state.die_value.ok_or(RuleError::NoPendingRoll)?;
        let color = self.state.current_color();
        let piece = self
            .state
            .participant_mut(color)
            .piece_mut(slot)
            .ok_or(RuleError::InvalidSlot(slot))?;
        let target = piece
            .move_by(die)
            .ok_or(RuleError::IllegalMove { color, slot, die })?;

        let captured = target
            .landing_cell()
            .and_then(|cell| capture_target(&self.state, color, cell));
        if let Some(victim) = captured {
            self.send_to_yard(victim);
        }
        Ok(self.resolve_move(color, slot, target.from, target.to, captured, die))
    }

    fn send_to_yard(&mut self, victim: PieceId) {
        if let Some(piece) = self
            .state
            .participant_mut(victim.color)
            .piece_mut(victim.slot)
        {
            piece.reset_to_yard();
        }
    }

    fn resolve_move(
        &mut self,
        color: Color,
        slot: u8,
        from: PieceLocation,
        to: PieceLocation,
        captured: Option<PieceId>,
        die: u8,
    ) -> MoveOutcome {
        self.state.die_value = None;
        self.state.log(MatchEvent::Moved {
            piece: PieceId { color, slot },
            from,
            to,
        });
        if let (Some(victim), Some(cell)) = (captured, to.track_cell()) {
            debug!(?color, ?victim, cell, "captured");
            self.state.log(MatchEvent::Captured {
                by: color,
                piece: victim,
                cell,
            });
        }

        let finished_piece = to.is_finished() && !from.is_finished();
        let finish_rank = if finished_piece {
            self.state.record_finish(color)
        } else {
            None
        };
        if let Some(rank) = finish_rank {
            info!(?color, rank, "participant finished");
            self.state.log(MatchEvent::Finished { color, rank });
        }

        let earned_bonus = die == MAX_DIE_VALUE || captured.is_some() || finished_piece;
        let resolution = if self.state.is_game_over() {
            TurnResolution::GameOver {
                winner: self.state.winner(),
            }
        } else if earned_bonus && !self.state.participant(color).has_finished_all() {
            TurnResolution::Bonus { color }
        } else {
            TurnResolution::Advance {
                next: self.state.next_unfinished_after(color).unwrap_or(color),
            }
        };

        let parked = self.config.hold_for_animation;
        if parked {
            self.state.phase = MatchPhase::AnimatingMove;
            self.parked = Some(resolution);
        } else {
            apply_resolution(&mut self.state, resolution);
        }

        let winner = match resolution {
            TurnResolution::GameOver { winner } => winner,
            _ => None,
        };
        MoveOutcome {
            color,
            slot,
            from,
            to,
            captured,
            bonus_roll: matches!(resolution, TurnResolution::Bonus { .. }),
            finished_piece,
            finish_rank,
            game_over: matches!(resolution, TurnResolution::GameOver { .. }),
            winner,
            next_color: resolution.next_color(color),
            parked,
        }
    }

    /// Release a move parked in `AnimatingMove`. Returns the color now to act.
    pub fn complete_move(&mut self) -> Result<Color, RuleError> {
        self.expect_phase(MatchPhase::AnimatingMove)?;
        let resolution = self.parked.take().ok_or(RuleError::WrongPhase {
            expected: MatchPhase::AnimatingMove,
            actual: self.state.phase,
        })?;
        apply_resolution(&mut self.state, resolution);
        Ok(self.state.current_color())
    }

    /// Remote peers never wait on our presentation.
    fn flush_parked(&mut self) {
        if let Some(resolution) = self.parked.take() {
            apply_resolution(&mut self.state, resolution);
        }
    }

    /// Best move for the current participant, if one is pending.
    pub fn suggest_move(&self) -> Option<u8> {
        if self.state.phase != MatchPhase::SelectingPiece {
            return None;
        }
        let die = self.state.die_value?;
        heuristic::suggest_move(&self.state, self.state.current_color(), die)
    }

    /// Apply a die value reported by the peer controlling `color`.
    ///
    /// A locally parked move is resolved first.
    pub fn apply_remote_roll(&mut self, color: Color, value: u8) -> Result<RollOutcome, RuleError> {
        self.flush_parked();
        self.expect_phase(MatchPhase::Rolling)?;
        self.expect_turn(color)?;
        self.apply_roll(value)
    }

    /// Apply a move reported by the peer controlling `color`.
    ///
    /// The reported destination and capture are written as given; bonus, finish
    /// and turn resolution follow the local rules using the pending die value.
    pub fn apply_remote_move(
        &mut self,
        color: Color,
        slot: u8,
        to: PieceLocation,
        captured: Option<PieceId>,
    ) -> Result<MoveOutcome, RuleError> {
        self.flush_parked();
        self.expect_phase(MatchPhase::SelectingPiece)?;
        self.expect_turn(color)?;
        let die = self.state.die_value.ok_or(RuleError::NoPendingRoll)?;
        if let Some(victim) = captured {
            if victim.color == color || to.track_cell().is_none() {
                return Err(RuleError::IllegalMove { color, slot, die });
            }
        }
        let piece = self
            .state
            .participant_mut(color)
            .piece_mut(slot)
            .ok_or(RuleError::InvalidSlot(slot))?;
        let from = piece.location;
        piece.location = to;
        if let Some(victim) = captured {
            self.send_to_yard(victim);
        }
        Ok(self.resolve_move(color, slot, from, to, captured, die))
    }

    /// Full encoding of the settled state (a parked move counts as resolved).
    pub fn snapshot(&self, sequence: u32) -> FullStatePayload {
        match self.parked {
            Some(resolution) => {
                let mut settled = self.state.clone();
                apply_resolution(&mut settled, resolution);
                snapshot::capture(&settled, sequence)
            }
            None => snapshot::capture(&self.state, sequence),
        }
    }

    /// Overwrite local state with `payload`.
    pub fn restore_snapshot(&mut self, payload: &FullStatePayload) -> Result<(), RuleError> {
        let restored = snapshot::restore(&self.state, payload)?;
        self.state = restored;
        self.parked = None;
        debug!(sequence = payload.sequence, "snapshot restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludo_types::{PIECES_PER_COLOR, SAFE_CELLS, TRACK_LEN};
    use proptest::prelude::*;

    fn engine_with(setup: impl FnOnce(&mut MatchState)) -> RuleEngine {
        let mut state = MatchState::new();
        state.phase = MatchPhase::Rolling;
        setup(&mut state);
        RuleEngine::from_state(EngineConfig::default(), state, 7)
    }

    fn place(state: &mut MatchState, color: Color, slot: u8, location: PieceLocation) {
        state.participant_mut(color).pieces[slot as usize].location = location;
    }

    fn finish_all(state: &mut MatchState, color: Color) {
        for slot in 0..PIECES_PER_COLOR as u8 {
            place(state, color, slot, PieceLocation::Finished);
        }
        state.record_finish(color);
    }

    fn location(engine: &RuleEngine, color: Color, slot: u8) -> PieceLocation {
        engine.state().participant(color).pieces[slot as usize].location
    }

    #[test]
    fn test_start_hands_turn_to_red() {
        let mut engine = RuleEngine::with_seed(EngineConfig::default(), 1);
        assert_eq!(engine.phase(), MatchPhase::WaitingToStart);
        engine.start().unwrap();
        assert_eq!(engine.phase(), MatchPhase::Rolling);
        assert_eq!(engine.current_color(), Color::Red);
        assert_eq!(engine.state().events(), &[MatchEvent::Started]);
        assert!(matches!(engine.start(), Err(RuleError::WrongPhase { .. })));
    }

    #[test]
    fn test_roll_before_start_rejected() {
        let mut engine = RuleEngine::with_seed(EngineConfig::default(), 1);
        let before = engine.state().clone();
        assert_eq!(
            engine.roll(),
            Err(RuleError::WrongPhase {
                expected: MatchPhase::Rolling,
                actual: MatchPhase::WaitingToStart,
            })
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_invalid_die_value_rejected() {
        let mut engine = engine_with(|_| {});
        assert_eq!(engine.apply_roll(0), Err(RuleError::InvalidDieValue(0)));
        assert_eq!(engine.apply_roll(7), Err(RuleError::InvalidDieValue(7)));
        assert_eq!(engine.phase(), MatchPhase::Rolling);
        assert!(engine.state().events().is_empty());
    }

    #[test]
    fn test_seeded_roll_in_range() {
        let mut engine = RuleEngine::with_seed(EngineConfig::default(), 99);
        engine.start().unwrap();
        for _ in 0..50 {
            if engine.phase() == MatchPhase::SelectingPiece {
                let slot = engine.suggest_move().unwrap();
                engine.move_piece(slot).unwrap();
                continue;
            }
            let outcome = engine.roll().unwrap();
            assert!((1..=6).contains(&outcome.value));
        }
    }

    #[test]
    fn test_six_from_yard_enters_start_cell_with_bonus() {
        let mut engine = RuleEngine::with_seed(EngineConfig::default(), 1);
        engine.start().unwrap();

        let roll = engine.apply_roll(6).unwrap();
        assert_eq!(roll.next, RollNext::SelectPiece);
        assert_eq!(engine.phase(), MatchPhase::SelectingPiece);

        let outcome = engine.move_piece(0).unwrap();
        assert_eq!(outcome.from, PieceLocation::Yard);
        assert_eq!(outcome.to, PieceLocation::Track(Color::Red.start_cell()));
        assert!(outcome.bonus_roll);
        assert_eq!(outcome.next_color, Color::Red);
        assert_eq!(engine.phase(), MatchPhase::Rolling);
        assert_eq!(engine.current_color(), Color::Red);
        assert_eq!(engine.state().die_value, None);
    }

    #[test]
    fn test_no_legal_move_passes_turn() {
        let mut engine = engine_with(|_| {});
        let roll = engine.apply_roll(3).unwrap();
        assert_eq!(roll.next, RollNext::Passed { next: Color::Green });
        assert_eq!(engine.phase(), MatchPhase::Rolling);
        assert_eq!(engine.current_color(), Color::Green);
        assert_eq!(engine.state().die_value, None);
    }

    #[test]
    fn test_three_sixes_void_turn() {
        let mut engine = engine_with(|_| {});
        engine.apply_roll(6).unwrap();
        engine.move_piece(0).unwrap();
        engine.apply_roll(6).unwrap();
        engine.move_piece(0).unwrap();
        assert_eq!(engine.state().six_streak, 2);
        let before = engine.state().participant(Color::Red).clone();

        let roll = engine.apply_roll(6).unwrap();
        assert_eq!(roll.next, RollNext::Voided { next: Color::Green });
        assert_eq!(engine.state().participant(Color::Red), &before);
        assert_eq!(location(&engine, Color::Red, 0), PieceLocation::Track(6));
        assert_eq!(engine.current_color(), Color::Green);
        assert_eq!(engine.state().six_streak, 0);
        assert!(engine
            .state()
            .events()
            .contains(&MatchEvent::TurnVoided { color: Color::Red }));
    }

    #[test]
    fn test_non_six_resets_streak() {
        let mut engine = engine_with(|s| place(s, Color::Red, 0, PieceLocation::Track(2)));
        engine.apply_roll(6).unwrap();
        engine.move_piece(0).unwrap();
        assert_eq!(engine.state().six_streak, 1);
        engine.apply_roll(2).unwrap();
        assert_eq!(engine.state().six_streak, 0);
    }

    #[test]
    fn test_capture_single_opponent() {
        let mut engine = engine_with(|s| {
            place(s, Color::Red, 0, PieceLocation::Track(6));
            place(s, Color::Green, 0, PieceLocation::Track(10));
        });
        engine.apply_roll(4).unwrap();
        let outcome = engine.move_piece(0).unwrap();

        assert_eq!(outcome.to, PieceLocation::Track(10));
        assert_eq!(outcome.captured, PieceId::new(Color::Green, 0));
        assert!(outcome.bonus_roll);
        assert_eq!(location(&engine, Color::Green, 0), PieceLocation::Yard);
        assert_eq!(engine.current_color(), Color::Red);
        assert_eq!(engine.phase(), MatchPhase::Rolling);
    }

    #[test]
    fn test_safe_cell_never_captures() {
        for cell in SAFE_CELLS {
            // Any color that reaches `cell` with a 4 without turning home.
            let mover = Color::ALL
                .into_iter()
                .find(|color| (4..=50).contains(&color.progress_from_start(cell)))
                .unwrap();
            let opponent = mover.next();
            let mut engine = engine_with(|s| {
                s.set_current_color(mover);
                place(s, mover, 0, PieceLocation::Track((cell + TRACK_LEN - 4) % TRACK_LEN));
                place(s, opponent, 0, PieceLocation::Track(cell));
            });
            engine.apply_roll(4).unwrap();
            let outcome = engine.move_piece(0).unwrap();

            assert_eq!(outcome.captured, None, "cell {cell}");
            assert!(!outcome.bonus_roll, "cell {cell}");
            assert_eq!(location(&engine, mover, 0), PieceLocation::Track(cell));
            assert_eq!(location(&engine, opponent, 0), PieceLocation::Track(cell));
            assert_eq!(engine.current_color(), opponent);
        }
    }

    #[test]
    fn test_stacked_opponents_are_immune() {
        let mut engine = engine_with(|s| {
            place(s, Color::Red, 0, PieceLocation::Track(6));
            place(s, Color::Green, 0, PieceLocation::Track(10));
            place(s, Color::Green, 1, PieceLocation::Track(10));
        });
        engine.apply_roll(4).unwrap();
        let outcome = engine.move_piece(0).unwrap();

        assert_eq!(outcome.captured, None);
        assert!(!outcome.bonus_roll);
        assert_eq!(location(&engine, Color::Green, 0), PieceLocation::Track(10));
        assert_eq!(location(&engine, Color::Green, 1), PieceLocation::Track(10));
    }

    #[test]
    fn test_illegal_moves_leave_state_untouched() {
        let mut engine = engine_with(|s| place(s, Color::Red, 0, PieceLocation::Track(6)));
        assert!(matches!(engine.move_piece(0), Err(RuleError::WrongPhase { .. })));

        engine.apply_roll(3).unwrap();
        let before = engine.state().clone();
        assert_eq!(engine.move_piece(4), Err(RuleError::InvalidSlot(4)));
        assert_eq!(
            engine.move_piece(1),
            Err(RuleError::IllegalMove {
                color: Color::Red,
                slot: 1,
                die: 3,
            })
        );
        assert_eq!(engine.state(), &before);
        assert!(matches!(engine.roll(), Err(RuleError::WrongPhase { .. })));
    }

    #[test]
    fn test_home_path_overshoot_passes() {
        let mut engine = engine_with(|s| {
            place(s, Color::Red, 0, PieceLocation::HomePath(4));
            for slot in 1..4 {
                place(s, Color::Red, slot, PieceLocation::Finished);
            }
        });
        let roll = engine.apply_roll(3).unwrap();
        assert_eq!(roll.next, RollNext::Passed { next: Color::Green });
        assert_eq!(location(&engine, Color::Red, 0), PieceLocation::HomePath(4));
    }

    #[test]
    fn test_finishing_piece_grants_bonus() {
        let mut engine = engine_with(|s| place(s, Color::Red, 0, PieceLocation::HomePath(3)));
        engine.apply_roll(3).unwrap();
        let outcome = engine.move_piece(0).unwrap();
        assert!(outcome.finished_piece);
        assert!(outcome.bonus_roll);
        assert_eq!(outcome.finish_rank, None);
        assert_eq!(engine.current_color(), Color::Red);
    }

    #[test]
    fn test_fourth_piece_records_rank_once_without_bonus() {
        let mut engine = engine_with(|s| {
            for slot in 0..3 {
                place(s, Color::Red, slot, PieceLocation::Finished);
            }
            place(s, Color::Red, 3, PieceLocation::HomePath(5));
        });
        engine.apply_roll(1).unwrap();
        let outcome = engine.move_piece(3).unwrap();

        assert_eq!(outcome.finish_rank, Some(1));
        assert!(!outcome.bonus_roll);
        assert!(!outcome.game_over);
        assert_eq!(outcome.next_color, Color::Green);
        assert_eq!(engine.state().finish_order, vec![Color::Red]);

        let mut state = engine.state().clone();
        assert_eq!(state.record_finish(Color::Red), None);
        assert_eq!(state.finish_order, vec![Color::Red]);
    }

    #[test]
    fn test_last_finish_ends_match() {
        let mut engine = engine_with(|s| {
            finish_all(s, Color::Green);
            finish_all(s, Color::Yellow);
            for slot in 0..3 {
                place(s, Color::Red, slot, PieceLocation::Finished);
            }
            place(s, Color::Red, 3, PieceLocation::HomePath(4));
        });
        engine.apply_roll(2).unwrap();
        let outcome = engine.move_piece(3).unwrap();

        assert!(outcome.game_over);
        assert_eq!(outcome.winner, Some(Color::Green));
        assert_eq!(outcome.finish_rank, Some(3));
        assert_eq!(engine.phase(), MatchPhase::GameOver);
        assert_eq!(engine.state().participant(Color::Blue).finish_rank, None);
        assert!(matches!(engine.roll(), Err(RuleError::WrongPhase { .. })));
    }

    #[test]
    fn test_turn_skips_finished_participants() {
        let mut engine = engine_with(|s| finish_all(s, Color::Green));
        let roll = engine.apply_roll(2).unwrap();
        assert_eq!(roll.next, RollNext::Passed { next: Color::Yellow });
    }

    #[test]
    fn test_hold_for_animation_parks_resolution() {
        let mut state = MatchState::new();
        state.phase = MatchPhase::Rolling;
        let config = EngineConfig {
            hold_for_animation: true,
        };
        let mut engine = RuleEngine::from_state(config, state, 3);

        engine.apply_roll(6).unwrap();
        let outcome = engine.move_piece(0).unwrap();
        assert!(outcome.parked);
        assert!(outcome.bonus_roll);
        assert_eq!(engine.phase(), MatchPhase::AnimatingMove);
        assert_eq!(location(&engine, Color::Red, 0), PieceLocation::Track(0));
        assert!(matches!(engine.roll(), Err(RuleError::WrongPhase { .. })));
        assert!(matches!(engine.move_piece(0), Err(RuleError::WrongPhase { .. })));

        // Snapshots report the settled state.
        assert_eq!(engine.snapshot(1).phase, MatchPhase::Rolling);

        assert_eq!(engine.complete_move(), Ok(Color::Red));
        assert_eq!(engine.phase(), MatchPhase::Rolling);
        assert!(matches!(engine.complete_move(), Err(RuleError::WrongPhase { .. })));
    }

    #[test]
    fn test_remote_roll_requires_current_color() {
        let mut engine = engine_with(|_| {});
        assert_eq!(
            engine.apply_remote_roll(Color::Green, 3),
            Err(RuleError::NotYourTurn {
                current: Color::Red,
                got: Color::Green,
            })
        );
        let roll = engine.apply_remote_roll(Color::Red, 6).unwrap();
        assert_eq!(roll.next, RollNext::SelectPiece);
    }

    #[test]
    fn test_remote_move_applies_reported_capture() {
        let mut engine = engine_with(|s| {
            place(s, Color::Red, 0, PieceLocation::Track(6));
            place(s, Color::Green, 2, PieceLocation::Track(10));
        });
        engine.apply_remote_roll(Color::Red, 4).unwrap();
        assert_eq!(
            engine.apply_remote_move(
                Color::Red,
                0,
                PieceLocation::Track(10),
                PieceId::new(Color::Red, 1),
            ),
            Err(RuleError::IllegalMove {
                color: Color::Red,
                slot: 0,
                die: 4,
            })
        );

        let outcome = engine
            .apply_remote_move(
                Color::Red,
                0,
                PieceLocation::Track(10),
                PieceId::new(Color::Green, 2),
            )
            .unwrap();
        assert!(outcome.bonus_roll);
        assert_eq!(location(&engine, Color::Green, 2), PieceLocation::Yard);
        assert_eq!(location(&engine, Color::Red, 0), PieceLocation::Track(10));
        assert_eq!(engine.current_color(), Color::Red);
    }

    #[test]
    fn test_remote_move_resolves_parked_move_first() {
        let mut state = MatchState::new();
        state.phase = MatchPhase::Rolling;
        place(&mut state, Color::Red, 0, PieceLocation::Track(2));
        let config = EngineConfig {
            hold_for_animation: true,
        };
        let mut engine = RuleEngine::from_state(config, state, 3);
        engine.apply_roll(2).unwrap();
        engine.move_piece(0).unwrap();
        assert_eq!(engine.phase(), MatchPhase::AnimatingMove);

        let roll = engine.apply_remote_roll(Color::Green, 1).unwrap();
        assert_eq!(roll.next, RollNext::Passed { next: Color::Yellow });
    }

    #[test]
    fn test_snapshot_restores_into_fresh_engine() {
        let mut source = RuleEngine::with_seed(EngineConfig::default(), 11);
        source.start().unwrap();
        for _ in 0..40 {
            match source.phase() {
                MatchPhase::SelectingPiece => {
                    let slot = source.suggest_move().unwrap();
                    source.move_piece(slot).unwrap();
                }
                MatchPhase::Rolling => {
                    source.roll().unwrap();
                }
                _ => break,
            }
        }

        let payload = source.snapshot(17);
        let mut replica = RuleEngine::with_seed(EngineConfig::default(), 0);
        replica.restore_snapshot(&payload).unwrap();

        let (a, b) = (source.state(), replica.state());
        assert_eq!(a.participants, b.participants);
        assert_eq!(a.current_color(), b.current_color());
        assert_eq!(a.phase, b.phase);
        assert_eq!(a.die_value, b.die_value);
        assert_eq!(a.six_streak, b.six_streak);
        assert_eq!(a.finish_order, b.finish_order);
        assert_eq!(
            b.events().last(),
            Some(&MatchEvent::SnapshotRestored { sequence: 17 })
        );
    }

    #[test]
    fn test_inconsistent_snapshot_rejected() {
        let mut engine = engine_with(|_| {});
        let mut payload = engine.snapshot(3);
        payload.finish_order = vec![Color::Blue];
        let before = engine.state().clone();
        assert!(matches!(
            engine.restore_snapshot(&payload),
            Err(RuleError::InvalidSnapshot(_))
        ));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_suggest_prefers_capture() {
        let engine = engine_with(|s| {
            s.phase = MatchPhase::SelectingPiece;
            s.die_value = Some(4);
            place(s, Color::Red, 0, PieceLocation::Track(30));
            place(s, Color::Red, 1, PieceLocation::Track(6));
            place(s, Color::Green, 0, PieceLocation::Track(10));
        });
        assert_eq!(engine.suggest_move(), Some(1));
    }

    #[test]
    fn test_suggest_prefers_leaving_yard_then_safe_cell() {
        let engine = engine_with(|s| {
            s.phase = MatchPhase::SelectingPiece;
            s.die_value = Some(6);
            place(s, Color::Red, 0, PieceLocation::Track(15));
        });
        // Slot 0 would land on safe cell 21, slot 1 leaves the yard.
        assert_eq!(engine.suggest_move(), Some(1));

        let engine = engine_with(|s| {
            s.phase = MatchPhase::SelectingPiece;
            s.die_value = Some(2);
            place(s, Color::Red, 0, PieceLocation::Track(30));
            place(s, Color::Red, 1, PieceLocation::Track(6));
        });
        assert_eq!(engine.suggest_move(), Some(1));
    }

    #[test]
    fn test_suggest_falls_back_to_progress() {
        let engine = engine_with(|s| {
            s.phase = MatchPhase::SelectingPiece;
            s.die_value = Some(2);
            place(s, Color::Red, 0, PieceLocation::Track(2));
            place(s, Color::Red, 1, PieceLocation::Track(30));
            place(s, Color::Red, 2, PieceLocation::HomePath(1));
        });
        assert_eq!(engine.suggest_move(), Some(2));

        let rolling = engine_with(|_| {});
        assert_eq!(rolling.suggest_move(), None);
    }

    proptest! {
        #[test]
        fn test_random_games_keep_invariants(seed in any::<u64>()) {
            let mut engine = RuleEngine::with_seed(EngineConfig::default(), seed);
            engine.start().unwrap();
            for _ in 0..1_500 {
                match engine.phase() {
                    MatchPhase::Rolling => {
                        let outcome = engine.roll().unwrap();
                        prop_assert!((1..=6).contains(&outcome.value));
                    }
                    MatchPhase::SelectingPiece => {
                        let slot = engine.suggest_move();
                        prop_assert!(slot.is_some());
                        engine.move_piece(slot.unwrap_or_default()).unwrap();
                    }
                    _ => break,
                }
                prop_assert!(engine.state().validate_invariants().is_ok());
                prop_assert!(engine.state().six_streak < MAX_SIX_STREAK);
                let over = engine.phase() == MatchPhase::GameOver;
                prop_assert_eq!(over, engine.state().is_game_over());
            }
        }
    }
}
