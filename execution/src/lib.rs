//! Ludo rule engine.
//!
//! [`RuleEngine`] is the single owner of a match's [`ludo_types::MatchState`]. It is
//! synchronous and single-threaded; callers serialize access (the node crate does
//! this with an actor loop).
//!
//! ## Determinism
//! - Die values come from a seedable [`rand::rngs::StdRng`]; the same seed and the
//!   same sequence of calls always produce the same match.
//! - Remote deltas and snapshots bypass the RNG entirely.

pub mod engine;
pub mod heuristic;
pub mod snapshot;

pub use engine::{
    EngineConfig, MoveOutcome, RollNext, RollOutcome, RuleEngine, RuleError, MAX_SIX_STREAK,
};
