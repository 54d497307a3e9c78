//! Game Escrow Lifecycle
//!
//! Buy-in accounting and status rules for a game, independent of how funds
//! are actually held. Amounts are in the smallest currency unit; times are
//! Unix seconds.
//!
//! ```text
//!   OPEN ──join (full)──► FILLED ──start──► ACTIVE ──declare_winner──► COMPLETE
//!    │                      │                 │ ▲
//!    │             cancel after deadline  halt│ │resume
//!    │                      │                 ▼ │
//!    └──────cancel─────────►CANCELLED◄─cancel─PAUSED
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::core::hash::Digest32;
use crate::core::ids::{GameId, PlayerId};
use crate::game::engine::{GameConfig, MIN_PLAYERS};
use crate::game::state::GameStatus;
use crate::MAX_PLAYERS;

/// Seconds a game must run before a winner may be declared.
pub const MINIMUM_GAME_TIME_SECS: u64 = 60;

/// Escrow rule violations. The escrow is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// Game is full
    #[error("game is full")]
    GameFull,
    /// Game is not open for joining
    #[error("game is not open for joining")]
    GameNotOpen,
    /// Player has already joined
    #[error("player has already joined this game")]
    AlreadyJoined,
    /// Game is not active
    #[error("game is not active")]
    GameNotActive,
    /// Caller is not the operator
    #[error("unauthorized: not the operator")]
    UnauthorizedOperator,
    /// Fill deadline has passed
    #[error("fill deadline has passed")]
    DeadlinePassed,
    /// Minimum game time not reached
    #[error("too early to declare winner")]
    TooEarlyForWinner,
    /// Winner is not a player
    #[error("winner is not a player in this game")]
    WinnerNotPlayer,
    /// Player is not in this game
    #[error("player is not in this game")]
    PlayerNotInGame,
    /// Operator tried to join
    #[error("operator cannot play in their own game")]
    OperatorCannotPlay,
    /// Game ID longer than 32 bytes
    #[error("game ID too long")]
    GameIdTooLong,
    /// Max players outside 1..=10
    #[error("invalid max players")]
    InvalidMaxPlayers,
    /// Zero buy-in
    #[error("invalid buy-in amount")]
    InvalidBuyIn,
    /// Zero fill window
    #[error("invalid fill deadline")]
    InvalidFillDeadline,
    /// Refund already claimed
    #[error("already refunded")]
    AlreadyRefunded,
    /// Refunds require a cancelled game
    #[error("game not cancelled")]
    GameNotCancelled,
    /// Cancel not allowed in the current state
    #[error("cannot cancel game in current state")]
    CannotCancel,
    /// Resume requires a paused game
    #[error("game not paused")]
    GameNotPaused,
    /// Start requires a filled game
    #[error("game not filled")]
    GameNotFilled,
    /// Buy-in times seats does not fit the balance
    #[error("balance overflow")]
    BalanceOverflow,
    /// Too few seats to run a game
    #[error("not enough players to start: {0}")]
    NotEnoughPlayers(usize),
}

/// Escrow record for one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEscrow {
    /// Game identifier
    pub game_id: GameId,
    /// Operator wallet
    pub operator: PlayerId,
    /// Current status
    pub status: GameStatus,
    /// Buy-in per player
    pub buy_in: u64,
    /// Seats
    pub max_players: u8,
    /// Joined wallets, in join order
    pub players: Vec<PlayerId>,
    /// Game seed
    pub seed: Digest32,
    /// Declared winner
    pub winner: Option<PlayerId>,
    /// Hash of the proof submitted with the winner
    pub proof_hash: Option<Digest32>,
    /// Creation time
    pub created_at: u64,
    /// Last second players may join
    pub fill_deadline: u64,
    /// Start time
    pub started_at: Option<u64>,
    /// Refund claimed, per player
    pub refunded: Vec<bool>,
    /// Funds currently held
    pub balance: u64,
}

impl GameEscrow {
    /// Open a new game.
    pub fn create(
        game_id: &str,
        operator: PlayerId,
        buy_in: u64,
        max_players: u8,
        fill_deadline_hours: u64,
        seed: Digest32,
        now: u64,
    ) -> Result<Self, EscrowError> {
        let game_id = GameId::new(game_id).map_err(|_| EscrowError::GameIdTooLong)?;
        if max_players == 0 || max_players as usize > MAX_PLAYERS {
            return Err(EscrowError::InvalidMaxPlayers);
        }
        if buy_in == 0 {
            return Err(EscrowError::InvalidBuyIn);
        }
        if buy_in.checked_mul(max_players as u64).is_none() {
            return Err(EscrowError::BalanceOverflow);
        }
        if fill_deadline_hours == 0 {
            return Err(EscrowError::InvalidFillDeadline);
        }

        info!(game_id = %game_id, buy_in, max_players, "game created");
        Ok(Self {
            game_id,
            operator,
            status: GameStatus::Open,
            buy_in,
            max_players,
            players: Vec::with_capacity(max_players as usize),
            seed,
            winner: None,
            proof_hash: None,
            created_at: now,
            fill_deadline: now.saturating_add(fill_deadline_hours.saturating_mul(3600)),
            started_at: None,
            refunded: Vec::with_capacity(max_players as usize),
            balance: 0,
        })
    }

    fn require_operator(&self, caller: &PlayerId) -> Result<(), EscrowError> {
        if *caller != self.operator {
            return Err(EscrowError::UnauthorizedOperator);
        }
        Ok(())
    }

    /// Take a seat and deposit the buy-in. The game fills with the last seat.
    pub fn join(&mut self, player: PlayerId, now: u64) -> Result<(), EscrowError> {
        if self.status != GameStatus::Open {
            return Err(EscrowError::GameNotOpen);
        }
        if self.players.len() >= self.max_players as usize {
            return Err(EscrowError::GameFull);
        }
        if now >= self.fill_deadline {
            return Err(EscrowError::DeadlinePassed);
        }
        if player == self.operator {
            return Err(EscrowError::OperatorCannotPlay);
        }
        if self.players.contains(&player) {
            return Err(EscrowError::AlreadyJoined);
        }
        let balance = self
            .balance
            .checked_add(self.buy_in)
            .ok_or(EscrowError::BalanceOverflow)?;

        info!(game_id = %self.game_id, player = player.short(), "player joined");
        self.players.push(player);
        self.refunded.push(false);
        self.balance = balance;

        if self.players.len() == self.max_players as usize {
            self.status = GameStatus::Filled;
            info!(game_id = %self.game_id, "game filled");
        }
        Ok(())
    }

    /// Start a filled game.
    pub fn start(&mut self, operator: &PlayerId, now: u64) -> Result<(), EscrowError> {
        if self.status != GameStatus::Filled {
            return Err(EscrowError::GameNotFilled);
        }
        self.require_operator(operator)?;
        // A one-seat game fills but can never produce a contest
        if self.players.len() < MIN_PLAYERS {
            return Err(EscrowError::NotEnoughPlayers(self.players.len()));
        }
        self.status = GameStatus::Active;
        self.started_at = Some(now);
        info!(game_id = %self.game_id, "game started");
        Ok(())
    }

    /// Declare the winner and release the pot. Returns the payout.
    pub fn declare_winner(
        &mut self,
        operator: &PlayerId,
        winner: PlayerId,
        proof_hash: Digest32,
        now: u64,
    ) -> Result<u64, EscrowError> {
        if self.status != GameStatus::Active {
            return Err(EscrowError::GameNotActive);
        }
        self.require_operator(operator)?;
        if !self.players.contains(&winner) {
            return Err(EscrowError::WinnerNotPlayer);
        }
        if let Some(started_at) = self.started_at {
            if now < started_at.saturating_add(MINIMUM_GAME_TIME_SECS) {
                return Err(EscrowError::TooEarlyForWinner);
            }
        }

        let payout = self.balance;
        info!(game_id = %self.game_id, winner = winner.short(), payout, "winner declared");
        self.balance = 0;
        self.winner = Some(winner);
        self.proof_hash = Some(proof_hash);
        self.status = GameStatus::Complete;
        Ok(payout)
    }

    /// Cancel: always while open or paused, once filled only after the
    /// fill deadline.
    pub fn cancel(&mut self, operator: &PlayerId, now: u64) -> Result<(), EscrowError> {
        self.require_operator(operator)?;
        let can_cancel = match self.status {
            GameStatus::Open | GameStatus::Paused => true,
            GameStatus::Filled => now > self.fill_deadline,
            _ => false,
        };
        if !can_cancel {
            return Err(EscrowError::CannotCancel);
        }
        self.status = GameStatus::Cancelled;
        info!(game_id = %self.game_id, "game cancelled");
        Ok(())
    }

    /// Return a player's buy-in from a cancelled game. Returns the amount.
    pub fn claim_refund(&mut self, player: &PlayerId) -> Result<u64, EscrowError> {
        if self.status != GameStatus::Cancelled {
            return Err(EscrowError::GameNotCancelled);
        }
        let index = self
            .players
            .iter()
            .position(|p| p == player)
            .ok_or(EscrowError::PlayerNotInGame)?;
        if self.refunded[index] {
            return Err(EscrowError::AlreadyRefunded);
        }
        self.refunded[index] = true;
        self.balance = self.balance.saturating_sub(self.buy_in);
        info!(game_id = %self.game_id, player = player.short(), amount = self.buy_in, "refund claimed");
        Ok(self.buy_in)
    }

    /// Halt an active game.
    pub fn emergency_halt(&mut self, operator: &PlayerId) -> Result<(), EscrowError> {
        if self.status != GameStatus::Active {
            return Err(EscrowError::GameNotActive);
        }
        self.require_operator(operator)?;
        self.status = GameStatus::Paused;
        info!(game_id = %self.game_id, "game halted");
        Ok(())
    }

    /// Resume a halted game.
    pub fn resume(&mut self, operator: &PlayerId) -> Result<(), EscrowError> {
        if self.status != GameStatus::Paused {
            return Err(EscrowError::GameNotPaused);
        }
        self.require_operator(operator)?;
        self.status = GameStatus::Active;
        info!(game_id = %self.game_id, "game resumed");
        Ok(())
    }

    /// Engine config for this game's seats and seed.
    pub fn engine_config(&self) -> GameConfig {
        GameConfig::new(self.game_id.clone(), self.seed, self.players.clone())
    }
}
