//! Shared types for networked Ludo: board geometry, pieces, match state and the
//! peer wire protocol.

pub mod board;
pub mod codec;
pub mod participant;
pub mod piece;
pub mod state;
pub mod wire;

pub use board::{is_safe_cell, Color, COLOR_COUNT, HOME_PATH_LEN, PIECES_PER_COLOR, SAFE_CELLS, TRACK_LEN};
pub use codec::PlayerId;
pub use participant::Participant;
pub use piece::{MoveTarget, Piece, PieceId, PieceLocation, MAX_DIE_VALUE};
pub use state::{MatchEvent, MatchPhase, MatchState, StateInvariantError};
pub use wire::{MessageKind, Payload, WireMessage};
