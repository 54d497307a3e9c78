//! Round Engine
//!
//! Consumes round events in order and evolves [`GameState`] until one
//! player is left or the round cap is reached. This is the part that must
//! replay identically: given the same config and events, any two engines
//! reach byte-identical state.
//!
//! ## Round resolution
//!
//! ```text
//! event ──► validate ──► primary shot ──► derived shots (round ≥ 31)
//!                                              │
//!            notify ◄── append history ◄── apply shots to every
//!                                           active card in index order
//! ```
//!
//! Validation happens before anything is mutated, so a rejected event
//! leaves the engine exactly as it was.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::cell::Cell;
use crate::core::hash::{Digest32, StateHasher};
use crate::core::ids::{GameId, PlayerId};
use crate::core::rng::EntropyStream;
use crate::game::card::{generate_card, verify_card, Card};
use crate::game::events::{GameEvent, RoundEvent};
use crate::game::feed::RoundFeed;
use crate::game::state::{GameState, GameStatus, PlayerCard, RoundResult};
use crate::{FINAL_SUDDEN_DEATH_ROUND, GRID_CELLS, MAX_PLAYERS, MAX_ROUNDS, SUDDEN_DEATH_ROUND};

/// Domain separator for derived shot keys.
const SHOT_DOMAIN: &[u8] = b"BATTLE_DINGHY_SHOT_V1";

/// Minimum players in a game.
pub const MIN_PLAYERS: usize = 2;

// =============================================================================
// CONFIG & ERRORS
// =============================================================================

/// Everything needed to build (or rebuild) an engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Game identifier
    pub game_id: GameId,
    /// Finalized commit-reveal seed
    pub seed: Digest32,
    /// Wallets in player-index order
    pub players: Vec<PlayerId>,
}

impl GameConfig {
    /// Create a config.
    pub fn new(game_id: GameId, seed: Digest32, players: Vec<PlayerId>) -> Self {
        Self {
            game_id,
            seed,
            players,
        }
    }
}

/// Engine errors. The engine is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Fewer than two players.
    #[error("not enough players: {0} (min 2)")]
    NotEnoughPlayers(usize),
    /// More than the maximum.
    #[error("too many players: {0} (max 10)")]
    TooManyPlayers(usize),
    /// Same wallet listed twice.
    #[error("duplicate player {0}")]
    DuplicatePlayer(PlayerId),
    /// Game already has a winner.
    #[error("game is complete")]
    GameComplete,
    /// Game is halted.
    #[error("game is paused")]
    GamePaused,
    /// Round number is not the next one.
    #[error("round out of sequence: expected {expected}, got {got}")]
    OutOfSequence {
        /// Next valid round
        expected: u32,
        /// Round received
        got: u32,
    },
    /// Winning block is outside the grid.
    #[error("winning block {0} is outside the grid")]
    InvalidCell(u8),
    /// Status change not allowed from the current status.
    #[error("cannot {action} a game that is {status}")]
    InvalidTransition {
        /// Attempted change
        action: &'static str,
        /// Current status
        status: GameStatus,
    },
    /// Snapshot could not be decoded or is inconsistent.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// What one call to [`GameEngine::process_round`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    /// The committed round
    pub result: RoundResult,
    /// Notifications, in emission order
    pub events: Vec<GameEvent>,
}

// =============================================================================
// SHOT DERIVATION
// =============================================================================

/// Extra shots fired in a round.
pub fn sudden_death_shots(round: u32) -> usize {
    if round >= FINAL_SUDDEN_DEATH_ROUND {
        2
    } else if round >= SUDDEN_DEATH_ROUND {
        1
    } else {
        0
    }
}

/// Derived shots for a round.
///
/// Depends only on the round's proof and number, never on the seed or
/// cards. Cells are distinct from the primary shot and from each other.
pub fn derive_shots(proof: &str, round: u32, primary: Cell) -> Vec<Cell> {
    let count = sudden_death_shots(round);
    if count == 0 {
        return Vec::new();
    }

    let mut hasher = StateHasher::new(SHOT_DOMAIN);
    hasher.update_str(proof);
    hasher.update_u32(round);
    let mut stream = EntropyStream::new(hasher.finalize());

    let mut shots = Vec::with_capacity(count);
    while shots.len() < count {
        let Ok(cell) = Cell::new(stream.next_int(GRID_CELLS)) else { continue };
        if cell != primary && !shots.contains(&cell) {
            shots.push(cell);
        }
    }
    shots
}

/// Tie-break: fewest hits taken, then lowest player index.
pub(crate) fn select_winner<'a>(
    candidates: impl IntoIterator<Item = &'a PlayerCard>,
) -> Option<PlayerId> {
    candidates
        .into_iter()
        .min_by_key(|p| (p.hits_taken(), p.player_index))
        .map(|p| p.player_id.clone())
}

// =============================================================================
// ENGINE
// =============================================================================

type Listener = Box<dyn Fn(&GameEvent) + Send + Sync>;

/// Deterministic round engine for one game.
pub struct GameEngine {
    state: GameState,
    listeners: Vec<Listener>,
}

impl fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameEngine")
            .field("game_id", &self.state.game_id)
            .field("status", &self.state.status)
            .field("current_round", &self.state.current_round)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl GameEngine {
    /// Build an engine and derive every player's card.
    pub fn new(config: GameConfig) -> Result<Self, EngineError> {
        let count = config.players.len();
        if count < MIN_PLAYERS {
            return Err(EngineError::NotEnoughPlayers(count));
        }
        if count > MAX_PLAYERS {
            return Err(EngineError::TooManyPlayers(count));
        }

        let mut players = BTreeMap::new();
        for (index, id) in config.players.iter().enumerate() {
            let card = generate_card(&config.seed, id, index as u32);
            if players.insert(id.clone(), PlayerCard::new(card)).is_some() {
                return Err(EngineError::DuplicatePlayer(id.clone()));
            }
        }

        info!(game_id = %config.game_id, players = count, "game engine created");

        Ok(Self {
            state: GameState {
                game_id: config.game_id,
                seed: config.seed,
                status: GameStatus::Active,
                players,
                player_order: config.players,
                current_round: 0,
                rounds: Vec::new(),
                winner: None,
            },
            listeners: Vec::new(),
        })
    }

    /// Rebuild an engine by replaying `events` from scratch.
    pub fn recover(config: GameConfig, events: &[RoundEvent]) -> Result<Self, EngineError> {
        let mut engine = Self::new(config)?;
        for event in events {
            engine.process_round(event)?;
        }
        debug!(
            game_id = %engine.state.game_id,
            rounds = events.len(),
            "engine recovered from event history"
        );
        Ok(engine)
    }

    /// Resolve one round.
    pub fn process_round(&mut self, event: &RoundEvent) -> Result<RoundOutcome, EngineError> {
        match self.state.status {
            GameStatus::Complete => return Err(EngineError::GameComplete),
            GameStatus::Paused => return Err(EngineError::GamePaused),
            GameStatus::Active => {}
            status => {
                return Err(EngineError::InvalidTransition {
                    action: "process a round of",
                    status,
                })
            }
        }

        let round = self.state.current_round + 1;
        if event.round_number != round {
            return Err(EngineError::OutOfSequence {
                expected: round,
                got: event.round_number,
            });
        }
        let primary = Cell::try_from(event.winning_block)
            .map_err(|_| EngineError::InvalidCell(event.winning_block))?;
        let derived = derive_shots(&event.proof, round, primary);

        // Nothing below can fail
        let alive_before = self.state.alive_count();
        let mut eliminations = Vec::new();
        for shot in std::iter::once(primary).chain(derived.iter().copied()) {
            #[cfg(feature = "debug-tracing")]
            tracing::trace!(game_id = %self.state.game_id, round, cell = %shot, "shot");

            for id in &self.state.player_order {
                let Some(player) = self.state.players.get_mut(id) else { continue };
                if player.apply_shot(shot) && player.is_sunk() {
                    player.is_eliminated = true;
                    player.eliminated_at_round = Some(round);
                    eliminations.push(id.clone());
                }
            }
        }

        let alive = self.state.alive_count();
        let (winner, by_tie_break) = match alive {
            1 => (select_winner(self.state.active_players()), false),
            // Everyone left went down together
            0 => (
                select_winner(eliminations.iter().filter_map(|id| self.state.players.get(id))),
                true,
            ),
            _ if round >= MAX_ROUNDS => (select_winner(self.state.active_players()), true),
            _ => (None, false),
        };

        let result = RoundResult {
            round_number: round,
            primary_shot: primary,
            derived_shots: derived,
            eliminations,
            ore_proof: event.proof.clone(),
        };
        self.state.rounds.push(result.clone());
        self.state.current_round = round;
        if let Some(winner) = &winner {
            self.state.winner = Some(winner.clone());
            self.state.status = GameStatus::Complete;
        }

        // Notifications only after the round is committed
        let mut events = Vec::new();
        for (i, id) in result.eliminations.iter().enumerate() {
            info!(game_id = %self.state.game_id, round, player = id.short(), "player eliminated");
            events.push(GameEvent::PlayerEliminated {
                player_id: id.clone(),
                round,
                remaining: alive_before - (i + 1),
            });
        }
        debug!(
            game_id = %self.state.game_id,
            round,
            primary = %primary,
            derived = result.derived_shots.len(),
            alive,
            "round complete"
        );
        events.push(GameEvent::RoundComplete {
            result: result.clone(),
            alive,
        });
        if let Some(winner) = winner {
            info!(
                game_id = %self.state.game_id,
                winner = winner.short(),
                rounds = round,
                by_tie_break,
                "game complete"
            );
            events.push(GameEvent::GameComplete {
                winner,
                rounds: round,
                by_tie_break,
            });
        }

        for event in &events {
            for listener in &self.listeners {
                listener(event);
            }
        }

        Ok(RoundOutcome { result, events })
    }

    /// Drain a feed until the game completes or the feed runs dry.
    ///
    /// Returns the number of rounds processed.
    pub async fn run_feed<F: RoundFeed>(&mut self, feed: &mut F) -> Result<u32, EngineError> {
        let mut processed = 0;
        while !self.is_game_complete() {
            let Some(event) = feed.next_event().await else { break };
            self.process_round(&event)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Register a listener for every future notification.
    pub fn subscribe(&mut self, listener: impl Fn(&GameEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Halt rounds. ACTIVE → PAUSED.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state.status != GameStatus::Active {
            return Err(EngineError::InvalidTransition {
                action: "pause",
                status: self.state.status,
            });
        }
        self.state.status = GameStatus::Paused;
        info!(game_id = %self.state.game_id, "game paused");
        Ok(())
    }

    /// Continue rounds. PAUSED → ACTIVE.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.state.status != GameStatus::Paused {
            return Err(EngineError::InvalidTransition {
                action: "resume",
                status: self.state.status,
            });
        }
        self.state.status = GameStatus::Active;
        info!(game_id = %self.state.game_id, "game resumed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Readers
    // -------------------------------------------------------------------------

    /// Game identifier.
    pub fn game_id(&self) -> &GameId {
        &self.state.game_id
    }

    /// Config this engine was built from.
    pub fn config(&self) -> GameConfig {
        GameConfig::new(
            self.state.game_id.clone(),
            self.state.seed,
            self.state.player_order.clone(),
        )
    }

    /// Current status.
    pub fn status(&self) -> GameStatus {
        self.state.status
    }

    /// Winner, once decided.
    pub fn get_winner(&self) -> Option<&PlayerId> {
        self.state.winner.as_ref()
    }

    /// Whether a winner has been decided.
    pub fn is_game_complete(&self) -> bool {
        self.state.status == GameStatus::Complete
    }

    /// Last processed round.
    pub fn get_current_round(&self) -> u32 {
        self.state.current_round
    }

    /// A player's card and damage.
    pub fn get_player_card(&self, player: &PlayerId) -> Option<&PlayerCard> {
        self.state.players.get(player)
    }

    /// A player's generated card.
    pub fn get_generated_card(&self, player: &PlayerId) -> Option<&Card> {
        self.state.players.get(player).map(|p| &p.card)
    }

    /// Committed rounds, oldest first.
    pub fn get_round_history(&self) -> &[RoundResult] {
        &self.state.rounds
    }

    /// Full state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Hash over the full state.
    pub fn state_hash(&self) -> Digest32 {
        self.state.compute_hash()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Encode state as JSON. Listeners are not included.
    pub fn serialize(&self) -> Result<String, EngineError> {
        serde_json::to_string(&self.state).map_err(|e| EngineError::Snapshot(e.to_string()))
    }

    /// Rebuild from [`Self::serialize`] output.
    pub fn deserialize(text: &str) -> Result<Self, EngineError> {
        let state: GameState =
            serde_json::from_str(text).map_err(|e| EngineError::Snapshot(e.to_string()))?;
        Self::from_state(state)
    }

    /// Encode state compactly (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        bincode::serialize(&self.state).map_err(|e| EngineError::Snapshot(e.to_string()))
    }

    /// Rebuild from [`Self::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let state: GameState =
            bincode::deserialize(bytes).map_err(|e| EngineError::Snapshot(e.to_string()))?;
        Self::from_state(state)
    }

    /// Adopt a decoded state after checking it is internally consistent.
    pub fn from_state(state: GameState) -> Result<Self, EngineError> {
        let bad = |msg: &str| EngineError::Snapshot(msg.to_string());

        if state.player_order.len() != state.players.len() {
            return Err(bad("player order does not match players"));
        }
        for (index, id) in state.player_order.iter().enumerate() {
            let player = state.players.get(id).ok_or_else(|| bad("unknown player in order"))?;
            if player.player_index != index as u32
                || !verify_card(&state.seed, id, index as u32, &player.card)
            {
                return Err(bad("card does not match seed"));
            }
            if player.is_eliminated != player.is_sunk()
                || player.is_eliminated != player.eliminated_at_round.is_some()
            {
                return Err(bad("elimination flags inconsistent with hits"));
            }
            if !player.hit_cells.is_subset(&player.card.all_cells) {
                return Err(bad("hit outside the card"));
            }
        }
        let numbered = state
            .rounds
            .iter()
            .enumerate()
            .all(|(i, r)| r.round_number == i as u32 + 1);
        if !numbered || state.rounds.len() as u32 != state.current_round {
            return Err(bad("round history has gaps"));
        }
        if state.winner.is_some() != (state.status == GameStatus::Complete) {
            return Err(bad("winner does not match status"));
        }

        Ok(Self {
            state,
            listeners: Vec::new(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
