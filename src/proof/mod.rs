//! Fair-Randomness Protocols
//!
//! Fixes every input to the game seed before any party can predict it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF PIPELINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  oracle.rs           - External block source (injected)     │
//! │  block_commitment.rs - Operator commits to a future block   │
//! │  commit_reveal.rs    - Players commit then reveal secrets   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The verified block hash is the only sanctioned external input to
//! [`commit_reveal::CommitRevealManager::finalize`].

pub mod oracle;
pub mod block_commitment;
pub mod commit_reveal;

// Re-export key types
pub use oracle::{BlockOracle, MockOracle, OracleError};
pub use block_commitment::{
    BlockCommitment, BlockVerification, CommitmentError, FailureReason,
    OreBlockCommitmentManager, OreCommitmentConfig, OreSnapshot, SnapshotError,
    VerifyError, WaitError,
};
pub use commit_reveal::{
    compute_final_seed, create_commitment, generate_secret, verify_commitment,
    CommitRevealConfig, CommitRevealError, CommitRevealManager, PlayerCommitment,
    RevealPhase, RevealSnapshot, RevealStats,
};
