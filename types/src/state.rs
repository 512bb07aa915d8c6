use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use thiserror::Error as ThisError;

use crate::board::{Color, COLOR_COUNT};
use crate::participant::Participant;
use crate::piece::{PieceId, PieceLocation, MAX_DIE_VALUE};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    WaitingToStart = 0,
    Rolling = 1,
    SelectingPiece = 2,
    /// A move has been applied and the caller is still presenting it.
    AnimatingMove = 3,
    GameOver = 4,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::WaitingToStart => "waiting_to_start",
            MatchPhase::Rolling => "rolling",
            MatchPhase::SelectingPiece => "selecting_piece",
            MatchPhase::AnimatingMove => "animating_move",
            MatchPhase::GameOver => "game_over",
        }
    }
}

impl TryFrom<u8> for MatchPhase {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MatchPhase::WaitingToStart),
            1 => Ok(MatchPhase::Rolling),
            2 => Ok(MatchPhase::SelectingPiece),
            3 => Ok(MatchPhase::AnimatingMove),
            4 => Ok(MatchPhase::GameOver),
            _ => Err(()),
        }
    }
}

impl Write for MatchPhase {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for MatchPhase {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        MatchPhase::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for MatchPhase {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Append-only record of what happened during a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchEvent {
    Started,
    Rolled {
        color: Color,
        value: u8,
    },
    /// Third six in a row; the turn ended without a move.
    TurnVoided {
        color: Color,
    },
    /// No piece could move with the rolled value.
    TurnPassed {
        color: Color,
        value: u8,
    },
    Moved {
        piece: PieceId,
        from: PieceLocation,
        to: PieceLocation,
    },
    Captured {
        by: Color,
        piece: PieceId,
        cell: u8,
    },
    BonusRoll {
        color: Color,
    },
    Finished {
        color: Color,
        rank: u8,
    },
    GameOver {
        winner: Option<Color>,
    },
    SnapshotRestored {
        sequence: u32,
    },
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum StateInvariantError {
    #[error("turn index out of range (got={got})")]
    TurnIndexOutOfRange { got: usize },
    #[error("die value out of range (got={got})")]
    DieOutOfRange { got: u8 },
    #[error("selecting a piece without a pending die value")]
    MissingDie,
    #[error("finish rank for {color} does not match finish order")]
    RankMismatch { color: Color },
    #[error("{color} appears more than once in finish order")]
    DuplicateFinisher { color: Color },
    #[error("match over flag disagrees with phase {phase:?}")]
    GameOverMismatch { phase: MatchPhase },
}

/// Authoritative snapshot of a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchState {
    /// Participants in turn order (`Color::ALL`).
    pub participants: [Participant; COLOR_COUNT],
    pub current: usize,
    pub phase: MatchPhase,
    /// Pending die value; `None` between turns.
    pub die_value: Option<u8>,
    /// Consecutive sixes rolled by the current participant.
    pub six_streak: u8,
    /// Colors in the order they brought all four pieces home.
    pub finish_order: Vec<Color>,
    events: Vec<MatchEvent>,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            participants: Color::ALL.map(Participant::new),
            current: 0,
            phase: MatchPhase::WaitingToStart,
            die_value: None,
            six_streak: 0,
            finish_order: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn current_color(&self) -> Color {
        self.participants[self.current % COLOR_COUNT].color
    }

    pub fn set_current_color(&mut self, color: Color) {
        self.current = color.index();
    }

    pub fn participant(&self, color: Color) -> &Participant {
        &self.participants[color.index()]
    }

    pub fn participant_mut(&mut self, color: Color) -> &mut Participant {
        &mut self.participants[color.index()]
    }

    pub fn current_participant(&self) -> &Participant {
        self.participant(self.current_color())
    }

    pub fn piece_location(&self, id: PieceId) -> Option<PieceLocation> {
        self.participant(id.color).piece(id.slot).map(|p| p.location)
    }

    /// Participants that still have at least one piece outside home.
    pub fn unfinished_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| !p.has_finished_all())
            .count()
    }

    pub fn is_game_over(&self) -> bool {
        self.unfinished_count() <= 1
    }

    /// First participant to bring every piece home.
    pub fn winner(&self) -> Option<Color> {
        self.finish_order.first().copied()
    }

    /// Assign the next finish rank to `color` if all of its pieces are home.
    ///
    /// Returns the newly assigned rank; repeated calls for a participant that
    /// already holds a rank change nothing and return `None`.
    pub fn record_finish(&mut self, color: Color) -> Option<u8> {
        let participant = self.participant(color);
        if participant.finish_rank.is_some() || !participant.has_finished_all() {
            return None;
        }
        self.finish_order.push(color);
        let rank = self.finish_order.len() as u8;
        self.participant_mut(color).finish_rank = Some(rank);
        Some(rank)
    }

    /// Next color after `color` in rotation that has not finished.
    pub fn next_unfinished_after(&self, color: Color) -> Option<Color> {
        let mut candidate = color;
        for _ in 0..COLOR_COUNT {
            candidate = candidate.next();
            if !self.participant(candidate).has_finished_all() {
                return Some(candidate);
            }
        }
        None
    }

    /// Opposing pieces on main-track `cell`, grouped as `(color, slots)`.
    pub fn opponents_on_cell(&self, mover: Color, cell: u8) -> Vec<(Color, Vec<u8>)> {
        self.participants
            .iter()
            .filter(|p| p.color != mover)
            .filter_map(|p| {
                let slots = p.slots_on_cell(cell);
                (!slots.is_empty()).then_some((p.color, slots))
            })
            .collect()
    }

    pub fn log(&mut self, event: MatchEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[MatchEvent] {
        &self.events
    }

    pub fn validate_invariants(&self) -> Result<(), StateInvariantError> {
        if self.current >= COLOR_COUNT {
            return Err(StateInvariantError::TurnIndexOutOfRange { got: self.current });
        }
        if let Some(value) = self.die_value {
            if value == 0 || value > MAX_DIE_VALUE {
                return Err(StateInvariantError::DieOutOfRange { got: value });
            }
        }
        if self.phase == MatchPhase::SelectingPiece && self.die_value.is_none() {
            return Err(StateInvariantError::MissingDie);
        }
        for (index, color) in self.finish_order.iter().enumerate() {
            if self.finish_order[..index].contains(color) {
                return Err(StateInvariantError::DuplicateFinisher { color: *color });
            }
            if self.participant(*color).finish_rank != Some(index as u8 + 1) {
                return Err(StateInvariantError::RankMismatch { color: *color });
            }
        }
        for participant in &self.participants {
            if participant.finish_rank.is_some() && !self.finish_order.contains(&participant.color) {
                return Err(StateInvariantError::RankMismatch {
                    color: participant.color,
                });
            }
        }
        if self.phase == MatchPhase::GameOver && !self.is_game_over() {
            return Err(StateInvariantError::GameOverMismatch { phase: self.phase });
        }
        Ok(())
    }
}
