//! ORE Block Commitment Protocol
//!
//! Binds the operator to a future block height before that block is mined,
//! then verifies the binding once it exists. The verified block hash is the
//! external entropy mixed into the final seed.
//!
//! ```text
//!   create_commitment ──► (block mined) ──► verify_commitment ──► verified hash
//!         │                                        │
//!   target ≥ height + min_blocks_ahead     committed_at ≤ mined_at − buffer
//!                                          now − committed_at ≤ max_wait
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::{env_u64, ConfigError};
use crate::core::clock::SharedClock;
use crate::core::hash::{hash_concat, Digest32};
use crate::core::ids::GameId;
use crate::proof::oracle::{with_timeout, BlockOracle, OracleError};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Commitment timing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OreCommitmentConfig {
    /// Minimum distance between the current height and the target.
    pub min_blocks_ahead: u64,
    /// Maximum time between commitment and verification (ms).
    pub max_wait_time_ms: u64,
    /// Commitment must precede the block's mining time by at least this much (ms).
    pub commitment_buffer_ms: u64,
    /// Upper bound on each oracle call (ms).
    pub oracle_timeout_ms: u64,
}

impl Default for OreCommitmentConfig {
    fn default() -> Self {
        Self {
            min_blocks_ahead: 3,
            max_wait_time_ms: 600_000,
            commitment_buffer_ms: 30_000,
            oracle_timeout_ms: 5_000,
        }
    }
}

impl OreCommitmentConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_blocks_ahead: env_u64("ORE_MIN_BLOCKS_AHEAD", defaults.min_blocks_ahead)?,
            max_wait_time_ms: env_u64("ORE_MAX_WAIT_TIME_MS", defaults.max_wait_time_ms)?,
            commitment_buffer_ms: env_u64(
                "ORE_COMMITMENT_BUFFER_MS",
                defaults.commitment_buffer_ms,
            )?,
            oracle_timeout_ms: env_u64("ORE_ORACLE_TIMEOUT_MS", defaults.oracle_timeout_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_blocks_ahead == 0 {
            return Err(ConfigError::OutOfRange {
                field: "min_blocks_ahead",
                reason: "must be at least 1",
            });
        }
        if self.max_wait_time_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_wait_time_ms",
                reason: "must be positive",
            });
        }
        if self.commitment_buffer_ms >= self.max_wait_time_ms {
            return Err(ConfigError::OutOfRange {
                field: "commitment_buffer_ms",
                reason: "must be smaller than max_wait_time_ms",
            });
        }
        if self.oracle_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "oracle_timeout_ms",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Operator's binding to a future block height. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCommitment {
    /// Game this commitment belongs to.
    pub game_id: GameId,
    /// Height whose hash will supply entropy.
    pub target_block_height: u64,
    /// When the commitment was made (Unix ms).
    pub committed_at: u64,
    /// Hash over all other fields.
    pub commitment_hash: Digest32,
    /// Operator that made the commitment.
    pub operator_identity: String,
}

impl BlockCommitment {
    /// Recompute the hash from the other fields.
    ///
    /// The preimage is `"{game_id}:{target_block_height}:{committed_at}:{operator_identity}"`
    /// in UTF-8, with both numbers in decimal (`committed_at` in Unix
    /// milliseconds), and the digest is plain SHA-256 over it.
    pub fn compute_hash(
        game_id: &GameId,
        target_block_height: u64,
        committed_at: u64,
        operator_identity: &str,
    ) -> Digest32 {
        let target = target_block_height.to_string();
        let at = committed_at.to_string();
        hash_concat(&[
            game_id.as_str().as_bytes(),
            b":",
            target.as_bytes(),
            b":",
            at.as_bytes(),
            b":",
            operator_identity.as_bytes(),
        ])
    }

    /// Check the stored hash against the fields.
    pub fn hash_matches(&self) -> bool {
        Self::compute_hash(
            &self.game_id,
            self.target_block_height,
            self.committed_at,
            &self.operator_identity,
        ) == self.commitment_hash
    }

    /// Wall-clock time after which waiting is pointless (Unix ms).
    pub fn wait_deadline(&self, max_wait_time_ms: u64) -> u64 {
        self.committed_at.saturating_add(max_wait_time_ms)
    }
}

/// Why a commitment failed verification. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Stored hash does not match the commitment fields.
    InvalidCommitmentHash,
    /// Commitment was made too close to (or after) the block's mining time.
    CommitmentAfterBlock,
    /// Verification happened too long after the commitment.
    CommitmentExpired,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidCommitmentHash => "INVALID_COMMITMENT_HASH",
            Self::CommitmentAfterBlock => "COMMITMENT_AFTER_BLOCK",
            Self::CommitmentExpired => "COMMITMENT_EXPIRED",
        };
        f.write_str(s)
    }
}

/// Cached verdict for a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerification {
    /// The commitment that was checked.
    pub commitment: BlockCommitment,
    /// Hash of the target block, when it was looked up.
    pub actual_block_hash: Option<Digest32>,
    /// Mining time of the target block (Unix ms), when it was looked up.
    pub block_mined_at: Option<u64>,
    /// Whether the commitment was honest.
    pub verified: bool,
    /// Set when `verified` is false.
    pub failure_reason: Option<FailureReason>,
}

impl BlockVerification {
    fn failed(
        commitment: BlockCommitment,
        reason: FailureReason,
        block: Option<(Digest32, u64)>,
    ) -> Self {
        Self {
            commitment,
            actual_block_hash: block.map(|(h, _)| h),
            block_mined_at: block.map(|(_, t)| t),
            verified: false,
            failure_reason: Some(reason),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Commitment creation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// This game already has a commitment.
    #[error("commitment already exists for game {0}")]
    AlreadyExists(GameId),
    /// Target height is too close to the current height.
    #[error("target block {target} is below minimum {minimum}")]
    TargetTooSoon {
        /// Requested height.
        target: u64,
        /// Smallest acceptable height.
        minimum: u64,
    },
    /// Operator identity is empty.
    #[error("operator identity is empty")]
    InvalidOperator,
    /// Could not read the current height.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Non-terminal verification outcome. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// No commitment exists for the game.
    #[error("no commitment for game {0}")]
    NoCommitment(GameId),
    /// Target block not yet mined. Retryable.
    #[error("block {0} not found (not yet mined)")]
    BlockNotFound(u64),
    /// Oracle failed or timed out. Retryable.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl VerifyError {
    /// Whether polling again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BlockNotFound(_) | Self::Oracle(_))
    }
}

/// `wait_for_block` failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// No commitment exists for the game.
    #[error("no commitment for game {0}")]
    NoCommitment(GameId),
    /// Verification reached a terminal failure.
    #[error("commitment verification failed: {0}")]
    Failed(FailureReason),
    /// Deadline passed while the block was still missing.
    #[error("timed out waiting for block {0}")]
    Timeout(u64),
    /// Manager was stopped.
    #[error("commitment manager stopped")]
    Stopped,
}

/// Snapshot could not be encoded or decoded.
#[derive(Debug, Error)]
#[error("snapshot error: {0}")]
pub struct SnapshotError(pub String);

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Serialized manager state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OreSnapshot {
    /// All commitments, ordered by game ID.
    pub commitments: Vec<BlockCommitment>,
    /// All cached verdicts, ordered by game ID.
    pub verifications: Vec<BlockVerification>,
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owns every game's block commitment and cached verdict.
///
/// All map access goes through the manager; callers never see the locks.
pub struct OreBlockCommitmentManager<O: BlockOracle> {
    config: OreCommitmentConfig,
    oracle: O,
    clock: SharedClock,
    commitments: RwLock<BTreeMap<GameId, BlockCommitment>>,
    verifications: RwLock<BTreeMap<GameId, BlockVerification>>,
    stop_tx: watch::Sender<bool>,
}

impl<O: BlockOracle> OreBlockCommitmentManager<O> {
    /// Create a manager. Fails if the config is invalid.
    pub fn new(
        config: OreCommitmentConfig,
        oracle: O,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            oracle,
            clock,
            commitments: RwLock::new(BTreeMap::new()),
            verifications: RwLock::new(BTreeMap::new()),
            stop_tx,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &OreCommitmentConfig {
        &self.config
    }

    /// Commit to a future block for `game_id`.
    ///
    /// Without an explicit target, commits to `current + min_blocks_ahead`.
    pub async fn create_commitment(
        &self,
        game_id: &GameId,
        operator_identity: &str,
        target_height: Option<u64>,
    ) -> Result<BlockCommitment, CommitmentError> {
        if operator_identity.is_empty() {
            return Err(CommitmentError::InvalidOperator);
        }
        if self.commitments.read().await.contains_key(game_id) {
            return Err(CommitmentError::AlreadyExists(game_id.clone()));
        }

        let current = with_timeout(self.config.oracle_timeout(), self.oracle.current_height())
            .await?;
        let minimum = current.saturating_add(self.config.min_blocks_ahead);
        let target = target_height.unwrap_or(minimum);
        if target < minimum {
            return Err(CommitmentError::TargetTooSoon { target, minimum });
        }

        let committed_at = self.clock.now_ms();
        let commitment = BlockCommitment {
            game_id: game_id.clone(),
            target_block_height: target,
            committed_at,
            commitment_hash: BlockCommitment::compute_hash(
                game_id,
                target,
                committed_at,
                operator_identity,
            ),
            operator_identity: operator_identity.to_string(),
        };

        // Re-check under the write lock: a concurrent create may have won
        let mut commitments = self.commitments.write().await;
        if commitments.contains_key(game_id) {
            return Err(CommitmentError::AlreadyExists(game_id.clone()));
        }
        commitments.insert(game_id.clone(), commitment.clone());

        info!(
            game_id = %game_id,
            target_block = target,
            current_block = current,
            commitment_hash = %commitment.commitment_hash,
            "ORE block commitment created"
        );
        Ok(commitment)
    }

    /// Verify the commitment for `game_id` against the oracle.
    ///
    /// Terminal verdicts (success or failure) are cached and returned
    /// unchanged on later calls without touching the oracle. A missing
    /// block or oracle error is returned as `Err` and not cached.
    pub async fn verify_commitment(
        &self,
        game_id: &GameId,
    ) -> Result<BlockVerification, VerifyError> {
        if let Some(cached) = self.verifications.read().await.get(game_id) {
            return Ok(cached.clone());
        }

        let commitment = self
            .commitments
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or_else(|| VerifyError::NoCommitment(game_id.clone()))?;

        let verdict = self.evaluate(commitment).await?;

        let mut verifications = self.verifications.write().await;
        let stored = verifications
            .entry(game_id.clone())
            .or_insert(verdict)
            .clone();

        match stored.failure_reason {
            None => info!(
                game_id = %game_id,
                block = stored.commitment.target_block_height,
                "ORE block commitment verified"
            ),
            Some(reason) => warn!(game_id = %game_id, %reason, "ORE block commitment rejected"),
        }
        Ok(stored)
    }

    async fn evaluate(&self, commitment: BlockCommitment) -> Result<BlockVerification, VerifyError> {
        if !commitment.hash_matches() {
            return Ok(BlockVerification::failed(
                commitment,
                FailureReason::InvalidCommitmentHash,
                None,
            ));
        }

        let height = commitment.target_block_height;
        let limit = self.config.oracle_timeout();

        let block_hash = with_timeout(limit, self.oracle.block_hash(height))
            .await?
            .ok_or(VerifyError::BlockNotFound(height))?;
        let mined_at = with_timeout(limit, self.oracle.block_timestamp(height))
            .await?
            .ok_or(VerifyError::BlockNotFound(height))?;
        let block = Some((block_hash, mined_at));

        let deadline = mined_at.saturating_sub(self.config.commitment_buffer_ms);
        if commitment.committed_at > deadline {
            return Ok(BlockVerification::failed(
                commitment,
                FailureReason::CommitmentAfterBlock,
                block,
            ));
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(commitment.committed_at) > self.config.max_wait_time_ms {
            return Ok(BlockVerification::failed(
                commitment,
                FailureReason::CommitmentExpired,
                block,
            ));
        }

        Ok(BlockVerification {
            commitment,
            actual_block_hash: Some(block_hash),
            block_mined_at: Some(mined_at),
            verified: true,
            failure_reason: None,
        })
    }

    /// Poll until the commitment verifies, fails, times out, or the manager stops.
    pub async fn wait_for_block(
        &self,
        game_id: &GameId,
        poll_interval: Duration,
    ) -> Result<BlockVerification, WaitError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return Err(WaitError::Stopped);
        }

        let commitment = self
            .get_commitment(game_id)
            .await
            .ok_or_else(|| WaitError::NoCommitment(game_id.clone()))?;
        let target = commitment.target_block_height;
        let remaining_ms = commitment
            .wait_deadline(self.config.max_wait_time_ms)
            .saturating_sub(self.clock.now_ms());
        let deadline = tokio::time::Instant::now() + Duration::from_millis(remaining_ms);

        loop {
            match self.verify_commitment(game_id).await {
                Ok(v) => match v.failure_reason {
                    None => return Ok(v),
                    Some(reason) => return Err(WaitError::Failed(reason)),
                },
                Err(VerifyError::NoCommitment(id)) => return Err(WaitError::NoCommitment(id)),
                Err(e) => debug!(game_id = %game_id, error = %e, "block not ready, polling"),
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(game_id = %game_id, block = target, "gave up waiting for block");
                return Err(WaitError::Timeout(target));
            }

            let next_poll = deadline.min(tokio::time::Instant::now() + poll_interval);
            tokio::select! {
                _ = tokio::time::sleep_until(next_poll) => {}
                // Only ever flips to true, so any change means stopped
                _ = stop_rx.changed() => return Err(WaitError::Stopped),
            }
        }
    }

    /// Reject every pending and future `wait_for_block` with `Stopped`.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        info!("ORE block commitment manager stopped");
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Verified block hash, or `None` unless verification succeeded.
    ///
    /// This is the only way to read the block hash as entropy.
    pub async fn get_verified_block_hash(&self, game_id: &GameId) -> Option<Digest32> {
        self.verifications
            .read()
            .await
            .get(game_id)
            .filter(|v| v.verified)
            .and_then(|v| v.actual_block_hash)
    }

    /// Commitment for a game.
    pub async fn get_commitment(&self, game_id: &GameId) -> Option<BlockCommitment> {
        self.commitments.read().await.get(game_id).cloned()
    }

    /// Cached verdict for a game.
    pub async fn get_verification(&self, game_id: &GameId) -> Option<BlockVerification> {
        self.verifications.read().await.get(game_id).cloned()
    }

    /// Whether a commitment exists.
    pub async fn has_commitment(&self, game_id: &GameId) -> bool {
        self.commitments.read().await.contains_key(game_id)
    }

    /// Whether the commitment verified successfully.
    pub async fn is_verified(&self, game_id: &GameId) -> bool {
        self.get_verified_block_hash(game_id).await.is_some()
    }

    /// Capture all state.
    pub async fn export_state(&self) -> OreSnapshot {
        // Lock order: commitments, then verifications
        let commitments = self.commitments.read().await;
        let verifications = self.verifications.read().await;
        OreSnapshot {
            commitments: commitments.values().cloned().collect(),
            verifications: verifications.values().cloned().collect(),
        }
    }

    /// Replace all state with a snapshot.
    pub async fn restore(&self, snapshot: OreSnapshot) {
        let mut commitments = self.commitments.write().await;
        let mut verifications = self.verifications.write().await;
        *commitments = snapshot
            .commitments
            .into_iter()
            .map(|c| (c.game_id.clone(), c))
            .collect();
        *verifications = snapshot
            .verifications
            .into_iter()
            .map(|v| (v.commitment.game_id.clone(), v))
            .collect();
        info!(
            commitments = commitments.len(),
            verifications = verifications.len(),
            "ORE commitment state restored"
        );
    }

    /// Encode all state as JSON.
    pub async fn serialize(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(&self.export_state().await)?)
    }

    /// Replace all state from JSON produced by [`Self::serialize`].
    pub async fn deserialize(&self, text: &str) -> Result<(), SnapshotError> {
        let snapshot: OreSnapshot = serde_json::from_str(text)?;
        self.restore(snapshot).await;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
