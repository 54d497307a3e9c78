//! Game State
//!
//! Engine-owned state for one game. All maps are BTreeMap so iteration,
//! hashing and serialization are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::cell::Cell;
use crate::core::hash::{Digest32, StateHasher};
use crate::core::ids::{GameId, PlayerId};
use crate::game::card::Card;

/// Domain separator for state hashes.
const STATE_DOMAIN: &[u8] = b"BATTLE_DINGHY_STATE_V1";

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Accepting players
    Open,
    /// All seats taken, waiting to start
    Filled,
    /// Rounds in progress
    Active,
    /// Winner decided
    Complete,
    /// Cancelled, refunds open
    Cancelled,
    /// Halted by the operator
    Paused,
}

impl GameStatus {
    fn code(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Filled => 1,
            Self::Active => 2,
            Self::Complete => 3,
            Self::Cancelled => 4,
            Self::Paused => 5,
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

// =============================================================================
// PLAYER CARD
// =============================================================================

/// A player's card plus the damage taken so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCard {
    /// Owner
    pub player_id: PlayerId,
    /// Position in the game's player list
    pub player_index: u32,
    /// Fleet layout
    pub card: Card,
    /// Ship cells hit so far
    pub hit_cells: BTreeSet<Cell>,
    /// Every ship cell has been hit
    pub is_eliminated: bool,
    /// Round that landed the final hit
    pub eliminated_at_round: Option<u32>,
}

impl PlayerCard {
    /// Fresh, undamaged card.
    pub fn new(card: Card) -> Self {
        Self {
            player_id: card.player_id.clone(),
            player_index: card.player_index,
            card,
            hit_cells: BTreeSet::new(),
            is_eliminated: false,
            eliminated_at_round: None,
        }
    }

    /// Record a shot. Returns true if it hit an unhit ship cell.
    pub fn apply_shot(&mut self, cell: Cell) -> bool {
        if self.is_eliminated || !self.card.occupies(cell) {
            return false;
        }
        self.hit_cells.insert(cell)
    }

    /// Whether every ship cell has been hit.
    pub fn is_sunk(&self) -> bool {
        self.card.all_cells.is_subset(&self.hit_cells)
    }

    /// Number of ship cells hit.
    pub fn hits_taken(&self) -> usize {
        self.hit_cells.len()
    }

    /// Ship cells not yet hit.
    pub fn remaining_cells(&self) -> usize {
        self.card.all_cells.len() - self.hit_cells.len()
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_str(self.player_id.as_str());
        hasher.update_u32(self.player_index);
        for cell in &self.card.all_cells {
            hasher.update_u8(cell.index());
        }
        hasher.update_u32(self.hit_cells.len() as u32);
        for cell in &self.hit_cells {
            hasher.update_u8(cell.index());
        }
        hasher.update_bool(self.is_eliminated);
        hasher.update_u32(self.eliminated_at_round.unwrap_or(0));
    }
}

// =============================================================================
// ROUND RESULT
// =============================================================================

/// One resolved round. Immutable once appended to history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based round number
    pub round_number: u32,
    /// Cell chosen by the round's winning block
    pub primary_shot: Cell,
    /// Sudden-death shots derived from the proof
    pub derived_shots: Vec<Cell>,
    /// Players eliminated this round, in resolution order
    pub eliminations: Vec<PlayerId>,
    /// Proof carried by the round event
    pub ore_proof: String,
}

impl RoundResult {
    /// Primary shot followed by derived shots.
    pub fn shots(&self) -> impl Iterator<Item = Cell> + '_ {
        std::iter::once(self.primary_shot).chain(self.derived_shots.iter().copied())
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.round_number);
        hasher.update_u8(self.primary_shot.index());
        hasher.update_u32(self.derived_shots.len() as u32);
        for cell in &self.derived_shots {
            hasher.update_u8(cell.index());
        }
        hasher.update_u32(self.eliminations.len() as u32);
        for player in &self.eliminations {
            hasher.update_str(player.as_str());
        }
        hasher.update_str(&self.ore_proof);
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Game identifier
    pub game_id: GameId,
    /// Seed the cards were derived from
    pub seed: Digest32,
    /// Current status
    pub status: GameStatus,
    /// Players keyed by wallet
    pub players: BTreeMap<PlayerId, PlayerCard>,
    /// Wallets in player-index order
    pub player_order: Vec<PlayerId>,
    /// Last processed round (0 before the first)
    pub current_round: u32,
    /// Round history
    pub rounds: Vec<RoundResult>,
    /// Winner, once decided
    pub winner: Option<PlayerId>,
}

impl GameState {
    /// Players still in the game, in index order.
    pub fn active_players(&self) -> Vec<&PlayerCard> {
        self.player_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|p| !p.is_eliminated)
            .collect()
    }

    /// Number of players still in the game.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_eliminated).count()
    }

    /// Hash of the full state.
    pub fn compute_hash(&self) -> Digest32 {
        let mut hasher = StateHasher::new(STATE_DOMAIN);
        hasher.update_str(self.game_id.as_str());
        hasher.update_digest(&self.seed);
        hasher.update_u8(self.status.code());
        hasher.update_u32(self.current_round);

        hasher.update_u32(self.player_order.len() as u32);
        for id in &self.player_order {
            if let Some(player) = self.players.get(id) {
                player.hash_into(&mut hasher);
            }
        }

        hasher.update_u32(self.rounds.len() as u32);
        for round in &self.rounds {
            round.hash_into(&mut hasher);
        }

        match &self.winner {
            Some(winner) => {
                hasher.update_bool(true);
                hasher.update_str(winner.as_str());
            }
            None => hasher.update_bool(false),
        }
        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================
