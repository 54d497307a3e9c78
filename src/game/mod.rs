//! Game Module
//!
//! Card derivation and the round engine are deterministic. The escrow
//! lifecycle and registry wrap them for a hosting service.
//!
//! ## Module Structure
//!
//! - `card`: Seed → fleet layout, plus verification
//! - `state`: Game, player card and round state
//! - `events`: Round input events and output notifications
//! - `feed`: Round-entropy sources (precomputed or live)
//! - `engine`: Round resolution, replay and persistence
//! - `lifecycle`: Buy-in escrow status rules
//! - `registry`: Per-game owners for concurrent hosting

pub mod card;
pub mod state;
pub mod events;
pub mod feed;
pub mod engine;
pub mod lifecycle;
pub mod registry;

// Re-export key types
pub use card::{generate_card, verify_card, Card, Ship};
pub use state::{GameState, GameStatus, PlayerCard, RoundResult};
pub use events::{GameEvent, RoundEvent};
pub use feed::{ChannelFeed, RoundFeed, VecFeed};
pub use engine::{derive_shots, EngineError, GameConfig, GameEngine, RoundOutcome};
pub use lifecycle::{EscrowError, GameEscrow};
pub use registry::{GameRegistry, RegistryError};
