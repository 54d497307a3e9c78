//! Player Commit-Reveal Protocol
//!
//! Players publish `H(secret || wallet)` before the committed ORE block is
//! mined, then reveal their secrets. The final seed mixes every player's
//! entropy with the verified block hash.
//!
//! ```text
//!   committing ──start_reveal_phase──► revealing ──finalize──► finalized
//! ```
//!
//! Phases only move forward. A player who never reveals still contributes
//! their commitment hash as entropy, so withholding a reveal cannot remove
//! their influence on the seed.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{env_usize, ConfigError};
use crate::core::clock::SharedClock;
use crate::core::hash::{hash_concat, Digest32};
use crate::core::ids::{GameId, PlayerId};
use crate::MAX_PLAYERS;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Player count bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRevealConfig {
    /// Commitments required before the reveal phase may start.
    pub min_players: usize,
    /// Commitments accepted at most.
    pub max_players: usize,
}

impl Default for CommitRevealConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: MAX_PLAYERS,
        }
    }
}

impl CommitRevealConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_players: env_usize("COMMIT_REVEAL_MIN_PLAYERS", defaults.min_players)?,
            max_players: env_usize("COMMIT_REVEAL_MAX_PLAYERS", defaults.max_players)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the bounds are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players == 0 {
            return Err(ConfigError::OutOfRange {
                field: "min_players",
                reason: "must be at least 1",
            });
        }
        if self.max_players < self.min_players || self.max_players > MAX_PLAYERS {
            return Err(ConfigError::OutOfRange {
                field: "max_players",
                reason: "must be between min_players and 10",
            });
        }
        Ok(())
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealPhase {
    /// Accepting commitments.
    Committing,
    /// Accepting reveals.
    Revealing,
    /// Seed fixed.
    Finalized,
}

impl std::fmt::Display for RevealPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Committing => "committing",
            Self::Revealing => "revealing",
            Self::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// One player's commitment and, once revealed, their secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommitment {
    /// Committing wallet.
    pub wallet_id: PlayerId,
    /// `H(secret || wallet)`.
    pub commitment_hash: Digest32,
    /// Set once, after a matching reveal.
    pub revealed_secret: Option<String>,
    /// When the commitment was submitted (Unix ms).
    pub committed_at: u64,
    /// When the secret was revealed (Unix ms).
    pub revealed_at: Option<u64>,
}

impl PlayerCommitment {
    /// Entropy this player contributes to the seed.
    pub fn entropy(&self) -> String {
        match &self.revealed_secret {
            Some(secret) => secret.clone(),
            None => self.commitment_hash.to_hex(),
        }
    }
}

/// Summary counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealStats {
    /// Current phase.
    pub phase: RevealPhase,
    /// Number of commitments.
    pub total_commitments: usize,
    /// Number of reveals.
    pub total_reveals: usize,
    /// Commitments without a reveal.
    pub missing_reveals: usize,
    /// Whether the seed is fixed.
    pub finalized: bool,
}

/// Commit-reveal errors. State is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitRevealError {
    /// Operation not allowed in the current phase.
    #[error("expected {expected} phase, currently {actual}")]
    WrongPhase {
        /// Phase the operation requires.
        expected: RevealPhase,
        /// Current phase.
        actual: RevealPhase,
    },
    /// Wallet identifier is empty.
    #[error("invalid wallet")]
    InvalidWallet,
    /// Wallet already submitted a commitment.
    #[error("wallet {0} already committed")]
    AlreadyCommitted(PlayerId),
    /// Commitment is not a 64-character hex digest.
    #[error("invalid commitment hash")]
    InvalidCommitmentHash,
    /// Maximum player count reached.
    #[error("session full ({0} players)")]
    SessionFull(usize),
    /// Wallet never committed.
    #[error("wallet {0} has no commitment")]
    NotCommitted(PlayerId),
    /// Wallet already revealed.
    #[error("wallet {0} already revealed")]
    AlreadyRevealed(PlayerId),
    /// Secret does not hash to the stored commitment.
    #[error("secret does not match commitment for {0}")]
    SecretMismatch(PlayerId),
    /// External block hash is malformed.
    #[error("invalid ORE block hash")]
    InvalidOreBlockHash,
    /// Snapshot could not be decoded or is inconsistent.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// Serialized manager state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealSnapshot {
    /// Game this session belongs to.
    pub game_id: GameId,
    /// Player bounds.
    pub config: CommitRevealConfig,
    /// Current phase.
    pub phase: RevealPhase,
    /// Commitments in submission order.
    pub commitments: Vec<PlayerCommitment>,
    /// Wallets in reveal order.
    pub reveal_order: Vec<PlayerId>,
    /// Seed, once finalized.
    pub final_seed: Option<Digest32>,
}

// =============================================================================
// HASHING
// =============================================================================

/// Compute a player's commitment: `SHA256(secret || wallet)`.
pub fn create_commitment(secret: &str, wallet: &str) -> Digest32 {
    hash_concat(&[secret.as_bytes(), wallet.as_bytes()])
}

/// Check that `secret` and `wallet` open `commitment`.
pub fn verify_commitment(commitment: &Digest32, secret: &str, wallet: &str) -> bool {
    create_commitment(secret, wallet) == *commitment
}

/// Fresh random 32-byte secret, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive the 32-byte game seed.
///
/// `SHA256(entropy_1 || ... || entropy_n || hex(external_hash))`, where
/// entropies are ordered by wallet id ascending so the result does not
/// depend on the order commitments arrived in. Each wallet's entropy is its
/// revealed secret, or the lowercase hex of its commitment hash if it never
/// revealed. The external hash is appended as lowercase hex.
pub fn compute_final_seed<'a>(
    commitments: impl IntoIterator<Item = &'a PlayerCommitment>,
    external_hash: &Digest32,
) -> Digest32 {
    let mut sorted: Vec<&PlayerCommitment> = commitments.into_iter().collect();
    sorted.sort_by(|a, b| a.wallet_id.cmp(&b.wallet_id));

    let entropies: Vec<String> = sorted.iter().map(|c| c.entropy()).collect();
    let external_hex = external_hash.to_hex();
    let mut parts: Vec<&[u8]> = entropies.iter().map(|e| e.as_bytes()).collect();
    parts.push(external_hex.as_bytes());
    hash_concat(&parts)
}

// =============================================================================
// MANAGER
// =============================================================================

/// One game's commit-reveal session.
///
/// Mutations take `&mut self`; the owner of the session serializes access.
pub struct CommitRevealManager {
    game_id: GameId,
    config: CommitRevealConfig,
    clock: SharedClock,
    phase: RevealPhase,
    commitments: BTreeMap<PlayerId, PlayerCommitment>,
    commit_order: Vec<PlayerId>,
    reveal_order: Vec<PlayerId>,
    final_seed: Option<Digest32>,
}

impl CommitRevealManager {
    /// Create a session in the committing phase.
    pub fn new(
        game_id: GameId,
        config: CommitRevealConfig,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            game_id,
            config,
            clock,
            phase: RevealPhase::Committing,
            commitments: BTreeMap::new(),
            commit_order: Vec::new(),
            reveal_order: Vec::new(),
            final_seed: None,
        })
    }

    fn require_phase(&self, expected: RevealPhase) -> Result<(), CommitRevealError> {
        if self.phase != expected {
            return Err(CommitRevealError::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Record a player's commitment.
    pub fn submit_commitment(&mut self, wallet: &str, hash: &str) -> Result<(), CommitRevealError> {
        self.require_phase(RevealPhase::Committing)?;
        let wallet_id = PlayerId::new(wallet).map_err(|_| CommitRevealError::InvalidWallet)?;
        if self.commitments.contains_key(&wallet_id) {
            return Err(CommitRevealError::AlreadyCommitted(wallet_id));
        }
        let commitment_hash =
            Digest32::from_hex(hash).map_err(|_| CommitRevealError::InvalidCommitmentHash)?;
        if self.commitments.len() >= self.config.max_players {
            return Err(CommitRevealError::SessionFull(self.config.max_players));
        }

        let committed_at = self.clock.now_ms();
        debug!(game_id = %self.game_id, wallet = wallet_id.short(), "commitment received");
        self.commit_order.push(wallet_id.clone());
        self.commitments.insert(
            wallet_id.clone(),
            PlayerCommitment {
                wallet_id,
                commitment_hash,
                revealed_secret: None,
                committed_at,
                revealed_at: None,
            },
        );
        Ok(())
    }

    /// Move to the reveal phase once enough players have committed.
    ///
    /// Returns false, leaving the phase unchanged, when there are too few
    /// commitments or the session is not committing.
    pub fn start_reveal_phase(&mut self) -> bool {
        if self.phase != RevealPhase::Committing {
            return false;
        }
        if self.commitments.len() < self.config.min_players {
            debug!(
                game_id = %self.game_id,
                have = self.commitments.len(),
                need = self.config.min_players,
                "not enough commitments to start reveal phase"
            );
            return false;
        }
        self.phase = RevealPhase::Revealing;
        info!(game_id = %self.game_id, players = self.commitments.len(), "reveal phase started");
        true
    }

    /// Reveal a player's secret.
    pub fn reveal_secret(&mut self, wallet: &str, secret: &str) -> Result<(), CommitRevealError> {
        self.require_phase(RevealPhase::Revealing)?;
        let wallet_id = PlayerId::new(wallet).map_err(|_| CommitRevealError::InvalidWallet)?;
        let now = self.clock.now_ms();

        let commitment = self
            .commitments
            .get_mut(&wallet_id)
            .ok_or_else(|| CommitRevealError::NotCommitted(wallet_id.clone()))?;
        if commitment.revealed_secret.is_some() {
            return Err(CommitRevealError::AlreadyRevealed(wallet_id));
        }
        if !verify_commitment(&commitment.commitment_hash, secret, wallet) {
            warn!(game_id = %self.game_id, wallet = wallet_id.short(), "reveal does not match commitment");
            return Err(CommitRevealError::SecretMismatch(wallet_id));
        }

        commitment.revealed_secret = Some(secret.to_string());
        commitment.revealed_at = Some(now);
        debug!(game_id = %self.game_id, wallet = wallet_id.short(), "secret revealed");
        self.reveal_order.push(wallet_id);
        Ok(())
    }

    /// Fix the seed using the verified external block hash.
    ///
    /// The first success caches the seed; later calls return it unchanged
    /// whatever hash they pass.
    pub fn finalize(&mut self, external_hash: &str) -> Result<Digest32, CommitRevealError> {
        let external =
            Digest32::from_hex(external_hash).map_err(|_| CommitRevealError::InvalidOreBlockHash)?;
        if let Some(seed) = self.final_seed {
            return Ok(seed);
        }
        self.require_phase(RevealPhase::Revealing)?;

        let seed = compute_final_seed(self.commitments.values(), &external);
        self.final_seed = Some(seed);
        self.phase = RevealPhase::Finalized;
        info!(
            game_id = %self.game_id,
            players = self.commitments.len(),
            revealed = self.reveal_order.len(),
            seed = %seed,
            "seed finalized"
        );
        Ok(seed)
    }

    /// Game this session belongs to.
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Current phase.
    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    /// Whether the wallet committed.
    pub fn has_committed(&self, wallet: &str) -> bool {
        self.lookup(wallet).is_some()
    }

    /// Whether the wallet revealed.
    pub fn has_revealed(&self, wallet: &str) -> bool {
        self.lookup(wallet)
            .map(|c| c.revealed_secret.is_some())
            .unwrap_or(false)
    }

    fn lookup(&self, wallet: &str) -> Option<&PlayerCommitment> {
        PlayerId::new(wallet)
            .ok()
            .and_then(|id| self.commitments.get(&id))
    }

    /// Commitment record for a wallet.
    pub fn get_commitment(&self, wallet: &str) -> Option<&PlayerCommitment> {
        self.lookup(wallet)
    }

    /// Committed wallets in submission order.
    pub fn get_committed_players(&self) -> Vec<PlayerId> {
        self.commit_order.clone()
    }

    /// Revealed wallets in reveal order.
    pub fn get_revealed_players(&self) -> Vec<PlayerId> {
        self.reveal_order.clone()
    }

    /// Committed wallets that have not revealed, in submission order.
    pub fn get_missing_reveals(&self) -> Vec<PlayerId> {
        self.commit_order
            .iter()
            .filter(|id| {
                self.commitments
                    .get(*id)
                    .map(|c| c.revealed_secret.is_none())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Summary counters.
    pub fn get_stats(&self) -> RevealStats {
        RevealStats {
            phase: self.phase,
            total_commitments: self.commitments.len(),
            total_reveals: self.reveal_order.len(),
            missing_reveals: self.commitments.len() - self.reveal_order.len(),
            finalized: self.final_seed.is_some(),
        }
    }

    /// Seed, once finalized.
    pub fn get_final_seed(&self) -> Option<Digest32> {
        self.final_seed
    }

    /// Seed as hex, once finalized.
    pub fn get_final_seed_hex(&self) -> Option<String> {
        self.final_seed.map(|s| s.to_hex())
    }

    /// Capture all state.
    pub fn snapshot(&self) -> RevealSnapshot {
        RevealSnapshot {
            game_id: self.game_id.clone(),
            config: self.config.clone(),
            phase: self.phase,
            commitments: self
                .commit_order
                .iter()
                .filter_map(|id| self.commitments.get(id).cloned())
                .collect(),
            reveal_order: self.reveal_order.clone(),
            final_seed: self.final_seed,
        }
    }

    /// Rebuild a session from a snapshot, rejecting inconsistent state.
    pub fn from_snapshot(
        snapshot: RevealSnapshot,
        clock: SharedClock,
    ) -> Result<Self, CommitRevealError> {
        let bad = |msg: &str| CommitRevealError::Snapshot(msg.to_string());
        snapshot.config.validate().map_err(|e| CommitRevealError::Snapshot(e.to_string()))?;
        if snapshot.final_seed.is_some() != (snapshot.phase == RevealPhase::Finalized) {
            return Err(bad("final seed does not match phase"));
        }

        let mut commitments = BTreeMap::new();
        let mut commit_order = Vec::with_capacity(snapshot.commitments.len());
        for c in snapshot.commitments {
            if let Some(secret) = &c.revealed_secret {
                if !verify_commitment(&c.commitment_hash, secret, c.wallet_id.as_str()) {
                    return Err(bad("revealed secret does not match commitment"));
                }
            }
            commit_order.push(c.wallet_id.clone());
            if commitments.insert(c.wallet_id.clone(), c).is_some() {
                return Err(bad("duplicate wallet"));
            }
        }

        let revealed = commitments.values().filter(|c| c.revealed_secret.is_some()).count();
        let reveal_order_valid = snapshot.reveal_order.len() == revealed
            && snapshot.reveal_order.iter().all(|id| {
                commitments
                    .get(id)
                    .map(|c| c.revealed_secret.is_some())
                    .unwrap_or(false)
            });
        if !reveal_order_valid {
            return Err(bad("reveal order does not match revealed commitments"));
        }

        Ok(Self {
            game_id: snapshot.game_id,
            config: snapshot.config,
            clock,
            phase: snapshot.phase,
            commitments,
            commit_order,
            reveal_order: snapshot.reveal_order,
            final_seed: snapshot.final_seed,
        })
    }

    /// Encode all state as JSON.
    pub fn serialize(&self) -> Result<String, CommitRevealError> {
        serde_json::to_string(&self.snapshot()).map_err(|e| CommitRevealError::Snapshot(e.to_string()))
    }

    /// Rebuild a session from JSON produced by [`Self::serialize`].
    pub fn deserialize(text: &str, clock: SharedClock) -> Result<Self, CommitRevealError> {
        let snapshot: RevealSnapshot =
            serde_json::from_str(text).map_err(|e| CommitRevealError::Snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot, clock)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use proptest::prelude::*;
    use crate::core::clock::ManualClock;

    const BLOCK_HASH: &str = "00000000000000000000000000000000000000000000000000000000000000ff";

    fn manager(min_players: usize) -> CommitRevealManager {
        CommitRevealManager::new(
            GameId::new("game-1").unwrap(),
            CommitRevealConfig { min_players, max_players: 10 },
            Arc::new(ManualClock::new(1_000)),
        )
        .unwrap()
    }

    fn commit(m: &mut CommitRevealManager, wallet: &str, secret: &str) {
        let hash = create_commitment(secret, wallet);
        m.submit_commitment(wallet, &hash.to_hex()).unwrap();
    }

    fn record(wallet: &str, secret: &str, revealed: bool) -> PlayerCommitment {
        PlayerCommitment {
            wallet_id: PlayerId::new(wallet).unwrap(),
            commitment_hash: create_commitment(secret, wallet),
            revealed_secret: revealed.then(|| secret.to_string()),
            committed_at: 0,
            revealed_at: None,
        }
    }

    #[test]
    fn test_verify_commitment() {
        let hash = create_commitment("secret", "wallet-a");
        assert!(verify_commitment(&hash, "secret", "wallet-a"));
        assert!(!verify_commitment(&hash, "secreT", "wallet-a"));
        assert!(!verify_commitment(&hash, "secret", "wallet-b"));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_start_reveal_requires_min_players() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");

        assert!(!m.start_reveal_phase());
        assert_eq!(m.phase(), RevealPhase::Committing);

        commit(&mut m, "bob", "s2");
        assert!(m.start_reveal_phase());
        assert_eq!(m.phase(), RevealPhase::Revealing);

        // Cannot start twice
        assert!(!m.start_reveal_phase());
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        let again = create_commitment("s2", "alice").to_hex();
        assert_eq!(
            m.submit_commitment("alice", &again),
            Err(CommitRevealError::AlreadyCommitted(PlayerId::new("alice").unwrap()))
        );
        assert_eq!(m.get_commitment("alice").unwrap().commitment_hash, create_commitment("s1", "alice"));
    }

    #[test]
    fn test_malformed_commitment_rejected() {
        let mut m = manager(2);
        assert_eq!(
            m.submit_commitment("alice", "abc"),
            Err(CommitRevealError::InvalidCommitmentHash)
        );
        assert_eq!(
            m.submit_commitment("", &"00".repeat(32)),
            Err(CommitRevealError::InvalidWallet)
        );
        assert!(!m.has_committed("alice"));
    }

    #[test]
    fn test_session_full() {
        let mut m = CommitRevealManager::new(
            GameId::new("g").unwrap(),
            CommitRevealConfig { min_players: 1, max_players: 2 },
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        commit(&mut m, "a", "1");
        commit(&mut m, "b", "2");
        let hash = create_commitment("3", "c").to_hex();
        assert_eq!(m.submit_commitment("c", &hash), Err(CommitRevealError::SessionFull(2)));
    }

    #[test]
    fn test_commit_after_reveal_phase_rejected() {
        let mut m = manager(1);
        commit(&mut m, "alice", "s1");
        assert!(m.start_reveal_phase());
        let hash = create_commitment("s2", "bob").to_hex();
        assert!(matches!(
            m.submit_commitment("bob", &hash),
            Err(CommitRevealError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_reveal_flow() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        commit(&mut m, "bob", "s2");

        // Reveal before reveal phase
        assert!(matches!(
            m.reveal_secret("alice", "s1"),
            Err(CommitRevealError::WrongPhase { expected: RevealPhase::Revealing, .. })
        ));

        assert!(m.start_reveal_phase());
        assert_eq!(
            m.reveal_secret("carol", "x"),
            Err(CommitRevealError::NotCommitted(PlayerId::new("carol").unwrap()))
        );
        assert_eq!(
            m.reveal_secret("alice", "wrong"),
            Err(CommitRevealError::SecretMismatch(PlayerId::new("alice").unwrap()))
        );
        assert!(!m.has_revealed("alice"));

        m.reveal_secret("alice", "s1").unwrap();
        assert!(m.has_revealed("alice"));
        assert_eq!(m.get_commitment("alice").unwrap().revealed_at, Some(1_000));
        assert_eq!(
            m.reveal_secret("alice", "s1"),
            Err(CommitRevealError::AlreadyRevealed(PlayerId::new("alice").unwrap()))
        );

        assert_eq!(m.get_revealed_players(), vec![PlayerId::new("alice").unwrap()]);
        assert_eq!(m.get_missing_reveals(), vec![PlayerId::new("bob").unwrap()]);
        let stats = m.get_stats();
        assert_eq!(stats.total_commitments, 2);
        assert_eq!(stats.total_reveals, 1);
        assert_eq!(stats.missing_reveals, 1);
        assert!(!stats.finalized);
    }

    #[test]
    fn test_committed_players_keep_insertion_order() {
        let mut m = manager(2);
        commit(&mut m, "zed", "1");
        commit(&mut m, "amy", "2");
        let names: Vec<String> = m.get_committed_players().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["zed", "amy"]);
    }

    #[test]
    fn test_finalize_invalid_hash() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        commit(&mut m, "bob", "s2");
        assert!(m.start_reveal_phase());

        let err = m.finalize("invalid-hash").unwrap_err();
        assert_eq!(err, CommitRevealError::InvalidOreBlockHash);
        assert!(err.to_string().contains("invalid ORE block hash"));
        assert_eq!(m.phase(), RevealPhase::Revealing);
        assert_eq!(m.get_final_seed(), None);
    }

    #[test]
    fn test_finalize_before_reveal_phase() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        assert!(matches!(m.finalize(BLOCK_HASH), Err(CommitRevealError::WrongPhase { .. })));
        assert_eq!(m.phase(), RevealPhase::Committing);
    }

    #[test]
    fn test_finalize_is_sticky() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        commit(&mut m, "bob", "s2");
        assert!(m.start_reveal_phase());
        m.reveal_secret("alice", "s1").unwrap();
        m.reveal_secret("bob", "s2").unwrap();

        let seed = m.finalize(BLOCK_HASH).unwrap();
        assert_eq!(m.phase(), RevealPhase::Finalized);
        assert_eq!(m.get_final_seed_hex(), Some(seed.to_hex()));

        // Different hash later does not shift the outcome
        let again = m.finalize(&"11".repeat(32)).unwrap();
        assert_eq!(again, seed);

        // No reveals after finalization
        assert!(matches!(
            m.reveal_secret("alice", "s1"),
            Err(CommitRevealError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_seed_matches_free_function() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        commit(&mut m, "bob", "s2");
        assert!(m.start_reveal_phase());
        m.reveal_secret("bob", "s2").unwrap();
        let seed = m.finalize(BLOCK_HASH).unwrap();

        let expected = compute_final_seed(
            &[record("alice", "s1", false), record("bob", "s2", true)],
            &Digest32::from_hex(BLOCK_HASH).unwrap(),
        );
        assert_eq!(seed, expected);
    }

    #[test]
    fn test_abstaining_keeps_influence() {
        let external = Digest32::from_hex(BLOCK_HASH).unwrap();
        let all_revealed = compute_final_seed(
            &[record("alice", "s1", true), record("bob", "s2", true)],
            &external,
        );
        let bob_abstains = compute_final_seed(
            &[record("alice", "s1", true), record("bob", "s2", false)],
            &external,
        );
        let bob_absent = compute_final_seed(&[record("alice", "s1", true)], &external);

        assert_ne!(all_revealed, bob_abstains);
        assert_ne!(bob_abstains, bob_absent);
    }

    #[test]
    fn test_seed_is_plain_digest_of_concatenation() {
        use sha2::{Digest as _, Sha256};

        let external = Digest32::new([0xab; 32]);
        // Listed out of order; bob never revealed
        let records = [record("bob", "s2", false), record("alice", "s1", true)];
        let seed = compute_final_seed(&records, &external);

        let bob_entropy = create_commitment("s2", "bob").to_hex();
        let preimage = format!("s1{}{}", bob_entropy, "ab".repeat(32));
        let expected: [u8; 32] = Sha256::digest(preimage.as_bytes()).into();
        assert_eq!(seed, Digest32::new(expected));

        let revealed = [record("alice", "s1", true), record("bob", "s2", true)];
        let expected: [u8; 32] = Sha256::digest(format!("s1s2{}", "ab".repeat(32))).into();
        assert_eq!(compute_final_seed(&revealed, &external), Digest32::new(expected));
    }

    #[test]
    fn test_external_hash_changes_seed() {
        let records = [record("alice", "s1", true), record("bob", "s2", true)];
        let a = compute_final_seed(&records, &Digest32::new([1; 32]));
        let b = compute_final_seed(&records, &Digest32::new([2; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        commit(&mut m, "bob", "s2");
        assert!(m.start_reveal_phase());
        m.reveal_secret("bob", "s2").unwrap();

        let text = m.serialize().unwrap();
        let mut restored =
            CommitRevealManager::deserialize(&text, Arc::new(ManualClock::new(5))).unwrap();
        assert_eq!(restored.snapshot(), m.snapshot());

        // Restored session continues identically
        assert_eq!(restored.finalize(BLOCK_HASH).unwrap(), m.finalize(BLOCK_HASH).unwrap());
    }

    #[test]
    fn test_snapshot_rejects_forged_reveal() {
        let mut m = manager(2);
        commit(&mut m, "alice", "s1");
        let mut snapshot = m.snapshot();
        snapshot.commitments[0].revealed_secret = Some("forged".into());
        snapshot.reveal_order.push(PlayerId::new("alice").unwrap());
        assert!(matches!(
            CommitRevealManager::from_snapshot(snapshot, Arc::new(ManualClock::new(0))),
            Err(CommitRevealError::Snapshot(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_seed_is_order_independent(
            entries in prop::collection::btree_map("[a-z]{1,8}", ("[a-f0-9]{1,16}", any::<bool>()), 1..8),
            rotate in 0usize..8,
            external in prop::array::uniform32(any::<u8>()),
        ) {
            let mut records: Vec<PlayerCommitment> = entries
                .iter()
                .map(|(wallet, (secret, revealed))| record(wallet, secret, *revealed))
                .collect();
            let external = Digest32::new(external);
            let forward = compute_final_seed(&records, &external);

            let len = records.len();
            records.rotate_left(rotate % len);
            records.reverse();
            let shuffled = compute_final_seed(&records, &external);

            prop_assert_eq!(forward, shuffled);
            prop_assert_eq!(forward.as_bytes().len(), 32);
        }

        #[test]
        fn prop_single_entropy_change_changes_seed(
            entries in prop::collection::btree_map("[a-z]{1,8}", "[a-f0-9]{1,16}", 1..6),
        ) {
            let external = Digest32::new([9; 32]);
            let records: Vec<PlayerCommitment> = entries
                .iter()
                .map(|(wallet, secret)| record(wallet, secret, true))
                .collect();
            let base = compute_final_seed(&records, &external);

            let mut changed = records.clone();
            let secret = changed[0].revealed_secret.take().unwrap_or_default();
            changed[0].revealed_secret = Some(format!("{secret}x"));
            prop_assert_ne!(base, compute_final_seed(&changed, &external));
        }
    }
}
