//! Core deterministic primitives.
//!
//! Everything downstream (commitments, seeds, cards, shots) is built from
//! these types. Nothing here reads ambient state except `SystemClock`.

pub mod hash;
pub mod rng;
pub mod cell;
pub mod ids;
pub mod clock;

// Re-export core types
pub use hash::{Digest32, DigestError, StateHasher, hash_bytes};
pub use rng::EntropyStream;
pub use cell::{Cell, InvalidCell, Orientation};
pub use ids::{GameId, PlayerId, IdError};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
