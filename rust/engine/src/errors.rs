use thiserror::Error;

use crate::cards::Card;
use crate::game::GameStatus;

/// Rejected transitions. The state a transition was attempted on is left
/// exactly as it was whenever one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Cannot {action} while game is {actual:?}")]
    Precondition {
        action: &'static str,
        actual: GameStatus,
    },
    #[error("Need exactly 4 players to start (have {seats})")]
    SeatCount { seats: usize },
    #[error("It's not {actual}'s turn (expected {expected})")]
    Turn { expected: String, actual: String },
    #[error("Must follow lead suit: {card} is not a legal play")]
    IllegalMove { card: Card },
    #[error("Card {card} is not in hand")]
    CardNotInHand { card: Card },
    #[error("Player {0} has no seat in this game")]
    UnknownPlayer(String),
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

impl GameError {
    /// Groups seat-count failures with status failures; both are a
    /// wrong precondition for the requested transition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            GameError::Precondition { .. } | GameError::SeatCount { .. }
        )
    }
}
