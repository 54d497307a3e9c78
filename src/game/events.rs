//! Game Events
//!
//! Input: [`RoundEvent`], one per round from the round-entropy feed.
//! Output: [`GameEvent`], emitted after each state change is committed.

use serde::{Deserialize, Serialize};

use crate::core::ids::PlayerId;
use crate::game::state::RoundResult;

/// External per-round entropy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEvent {
    /// 1-based round number
    pub round_number: u32,
    /// Winning block of the round, `0..25`
    pub winning_block: u8,
    /// Opaque proof string carried into history
    pub proof: String,
}

impl RoundEvent {
    /// Create an event.
    pub fn new(round_number: u32, winning_block: u8, proof: impl Into<String>) -> Self {
        Self {
            round_number,
            winning_block,
            proof: proof.into(),
        }
    }
}

/// Notification for external consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A player's last ship cell was hit
    PlayerEliminated {
        /// Eliminated wallet
        player_id: PlayerId,
        /// Round of the final hit
        round: u32,
        /// Players left after this elimination
        remaining: usize,
    },

    /// A round was appended to history
    RoundComplete {
        /// The committed round
        result: RoundResult,
        /// Players still in the game
        alive: usize,
    },

    /// The game has a winner
    GameComplete {
        /// Winning wallet
        winner: PlayerId,
        /// Rounds played
        rounds: u32,
        /// Decided by tie-break rather than last survivor
        by_tie_break: bool,
    },
}

impl GameEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerEliminated { .. } => "player_eliminated",
            Self::RoundComplete { .. } => "round_complete",
            Self::GameComplete { .. } => "game_complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_event_json_shape() {
        let event = RoundEvent::new(1, 24, "p1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["round_number"], 1);
        assert_eq!(json["winning_block"], 24);
        assert_eq!(json["proof"], "p1");
    }

    #[test]
    fn test_kind() {
        let event = GameEvent::GameComplete {
            winner: PlayerId::new("a").unwrap(),
            rounds: 3,
            by_tie_break: false,
        };
        assert_eq!(event.kind(), "game_complete");
    }
}
