//! Block Oracle
//!
//! The external append-only block sequence the operator commits against.
//! The real source is injected; [`MockOracle`] is a deterministic double
//! whose height and blocks are set on demand.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::core::hash::{Digest32, StateHasher};

/// Oracle call failure.
///
/// Distinct from "block not yet mined", which is `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Data source could not answer.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// Call exceeded the configured bound.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
}

/// Read access to an external block sequence.
pub trait BlockOracle: Send + Sync {
    /// Height of the newest known block.
    fn current_height(&self) -> impl Future<Output = Result<u64, OracleError>> + Send;

    /// Hash of the block at `height`, or `None` if not yet mined.
    fn block_hash(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<Option<Digest32>, OracleError>> + Send;

    /// Mined timestamp (Unix ms) of the block at `height`, or `None` if not yet mined.
    fn block_timestamp(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<Option<u64>, OracleError>> + Send;
}

/// Bound an oracle call by `limit`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, OracleError>>,
) -> Result<T, OracleError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(limit)),
    }
}

#[derive(Debug, Clone, Copy)]
struct MockBlock {
    hash: Digest32,
    mined_at: u64,
}

#[derive(Debug, Default)]
struct MockChain {
    height: u64,
    blocks: BTreeMap<u64, MockBlock>,
    offline: bool,
    latency: Option<Duration>,
}

/// Deterministic in-memory oracle.
///
/// Clones share the same chain, so a test can keep a handle while the
/// manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    chain: Arc<Mutex<MockChain>>,
    queries: Arc<AtomicUsize>,
}

impl MockOracle {
    /// Create an oracle at `height` with no mined blocks.
    pub fn new(height: u64) -> Self {
        let oracle = Self::default();
        oracle.set_height(height);
        oracle
    }

    fn with_chain<R>(&self, f: impl FnOnce(&mut MockChain) -> R) -> R {
        // A poisoned lock only means a test panicked mid-update; the data is still usable
        let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut chain)
    }

    /// Set the current height.
    pub fn set_height(&self, height: u64) {
        self.with_chain(|c| c.height = height);
    }

    /// Mine a block with an explicit hash and timestamp.
    ///
    /// Raises the current height if needed.
    pub fn mine_block(&self, height: u64, hash: Digest32, mined_at: u64) {
        self.with_chain(|c| {
            c.blocks.insert(height, MockBlock { hash, mined_at });
            c.height = c.height.max(height);
        });
    }

    /// Mine the next block with a hash derived from its height.
    pub fn mine_next(&self, mined_at: u64) -> (u64, Digest32) {
        self.with_chain(|c| {
            let height = c.height + 1;
            let hash = Self::derived_hash(height);
            c.blocks.insert(height, MockBlock { hash, mined_at });
            c.height = height;
            (height, hash)
        })
    }

    /// Hash that `mine_next` assigns to `height`.
    pub fn derived_hash(height: u64) -> Digest32 {
        let mut hasher = StateHasher::new(b"MOCK_ORE_BLOCK_V1");
        hasher.update_u64(height);
        hasher.finalize()
    }

    /// Forget a block (simulates a reorg in tests).
    pub fn remove_block(&self, height: u64) {
        self.with_chain(|c| {
            c.blocks.remove(&height);
        });
    }

    /// Make every call fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.with_chain(|c| c.offline = offline);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.with_chain(|c| c.latency = latency);
    }

    /// Number of calls answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, f: impl FnOnce(&MockChain) -> T) -> Result<T, OracleError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let latency = self.with_chain(|c| c.latency);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        self.with_chain(|c| {
            if c.offline {
                Err(OracleError::Unavailable("mock oracle offline".into()))
            } else {
                Ok(f(c))
            }
        })
    }
}

impl BlockOracle for MockOracle {
    async fn current_height(&self) -> Result<u64, OracleError> {
        self.answer(|c| c.height).await
    }

    async fn block_hash(&self, height: u64) -> Result<Option<Digest32>, OracleError> {
        self.answer(|c| c.blocks.get(&height).map(|b| b.hash)).await
    }

    async fn block_timestamp(&self, height: u64) -> Result<Option<u64>, OracleError> {
        self.answer(|c| c.blocks.get(&height).map(|b| b.mined_at)).await
    }
}
