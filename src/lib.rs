//! # Battle Dinghy
//!
//! Provably fair randomness pipeline and deterministic round engine for
//! Battle Dinghy, a last-fleet-floating elimination game on a 5×5 grid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BATTLE DINGHY                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                │
//! │  ├── hash.rs      - SHA-256 digests and state hashing       │
//! │  ├── rng.rs       - SHA-256 counter-mode entropy stream     │
//! │  ├── cell.rs      - Validated grid cells                    │
//! │  ├── ids.rs       - Game and player identifiers             │
//! │  └── clock.rs     - Injected wall clock                     │
//! │                                                             │
//! │  proof/           - Fair-randomness protocols               │
//! │  ├── oracle.rs    - External block source                   │
//! │  ├── block_commitment.rs - Operator block commitment        │
//! │  └── commit_reveal.rs    - Player commit-reveal seed        │
//! │                                                             │
//! │  game/            - Game logic                              │
//! │  ├── card.rs      - Seed → fleet layout                     │
//! │  ├── engine.rs    - Round resolution and replay             │
//! │  ├── lifecycle.rs - Escrow status rules                     │
//! │  └── registry.rs  - Per-game owners                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The operator commits to a block height a few blocks ahead.
//! 2. Players commit to secrets, then reveal them once the block is close.
//! 3. After the block is mined and verified, its hash and the players'
//!    entropy are hashed into the 32-byte game seed.
//! 4. Each player's fleet is derived from (seed, wallet, index).
//! 5. The engine consumes one round event per round until one fleet is left.
//!
//! ## Determinism Guarantee
//!
//! `core/`, `game/card.rs` and `game/engine.rs` are deterministic:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time in game logic
//! - All randomness from SHA-256 over fixed inputs
//!
//! Replaying the same round events from the same config reaches the
//! same state hash on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod proof;

// Re-export commonly used types
pub use crate::core::cell::Cell;
pub use crate::core::hash::Digest32;
pub use crate::core::ids::{GameId, PlayerId};
pub use game::engine::{GameConfig, GameEngine};
pub use game::events::RoundEvent;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grid side length
pub const GRID_SIZE: u32 = 5;

/// Cells on the grid
pub const GRID_CELLS: u32 = GRID_SIZE * GRID_SIZE;

/// Ship sizes, placed in this order
pub const SHIP_SIZES: [u8; 3] = [3, 2, 1];

/// Round cap
pub const MAX_ROUNDS: u32 = 50;

/// First round with one extra derived shot
pub const SUDDEN_DEATH_ROUND: u32 = 31;

/// First round with two extra derived shots
pub const FINAL_SUDDEN_DEATH_ROUND: u32 = 41;

/// Maximum players per game
pub const MAX_PLAYERS: usize = 10;
