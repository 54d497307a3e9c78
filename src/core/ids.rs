//! Game and Player Identifiers
//!
//! Both are validated strings. They implement Ord for deterministic
//! BTreeMap ordering.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum game ID length in bytes.
pub const MAX_GAME_ID_LEN: usize = 32;

/// Rejected identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Identifier is empty.
    #[error("identifier is empty")]
    Empty,
    /// Game ID exceeds the maximum length.
    #[error("game ID too long: {0} bytes (max 32)")]
    GameIdTooLong(usize),
}

/// Unique game identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    /// Create a validated game ID.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.len() > MAX_GAME_ID_LEN {
            return Err(IdError::GameIdTooLong(id.len()));
        }
        Ok(Self(id))
    }

    /// Generate a fresh game ID (simple UUID, 32 hex characters).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GameId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GameId> for String {
    fn from(id: GameId) -> Self {
        id.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GameId({})", self.0)
    }
}

/// Player wallet identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    /// Create a validated player ID.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(id))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl TryFrom<String> for PlayerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_id_validation() {
        assert!(GameId::new("game-1").is_ok());
        assert_eq!(GameId::new(""), Err(IdError::Empty));
        assert_eq!(GameId::new("x".repeat(33)), Err(IdError::GameIdTooLong(33)));
        assert!(GameId::new("x".repeat(32)).is_ok());
    }

    #[test]
    fn test_generated_game_id_fits() {
        let id = GameId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(GameId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_player_id_ordering() {
        let a = PlayerId::new("alice").unwrap();
        let b = PlayerId::new("bob").unwrap();
        assert!(a < b);
        assert_eq!(PlayerId::new(""), Err(IdError::Empty));
    }

    #[test]
    fn test_short() {
        let id = PlayerId::new("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU").unwrap();
        assert_eq!(id.short(), "7xKXtg2C");
        assert_eq!(PlayerId::new("abc").unwrap().short(), "abc");
    }

    #[test]
    fn test_serde_validates() {
        assert!(serde_json::from_str::<PlayerId>("\"\"").is_err());
        let id: GameId = serde_json::from_str("\"g1\"").unwrap();
        assert_eq!(id.as_str(), "g1");
    }
}
