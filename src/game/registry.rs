//! Game Registry
//!
//! One owner per game. Each engine sits behind its own lock, so rounds for
//! one game never interleave while different games proceed independently.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::core::ids::GameId;
use crate::game::engine::{EngineError, GameConfig, GameEngine, RoundOutcome};
use crate::game::events::{GameEvent, RoundEvent};
use crate::game::state::GameState;

/// Buffered notifications per subscriber.
const EVENT_BUFFER: usize = 256;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A game with this ID is already registered.
    #[error("game {0} already exists")]
    AlreadyExists(GameId),
    /// No game with this ID.
    #[error("game {0} not found")]
    NotFound(GameId),
    /// The engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Shared handle to one game's engine.
pub type EngineHandle = Arc<RwLock<GameEngine>>;

/// All live games.
pub struct GameRegistry {
    games: RwLock<BTreeMap<GameId, EngineHandle>>,
    events_tx: broadcast::Sender<(GameId, GameEvent)>,
}

impl GameRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            games: RwLock::new(BTreeMap::new()),
            events_tx,
        }
    }

    /// Build and register an engine.
    pub async fn create_game(&self, config: GameConfig) -> Result<EngineHandle, RegistryError> {
        let game_id = config.game_id.clone();
        let mut games = self.games.write().await;
        if games.contains_key(&game_id) {
            return Err(RegistryError::AlreadyExists(game_id));
        }

        let mut engine = GameEngine::new(config)?;
        self.forward_events(&mut engine);
        let handle = Arc::new(RwLock::new(engine));
        games.insert(game_id.clone(), handle.clone());
        info!(game_id = %game_id, games = games.len(), "game registered");
        Ok(handle)
    }

    /// Register an engine restored from a snapshot or replay.
    pub async fn adopt(&self, mut engine: GameEngine) -> Result<EngineHandle, RegistryError> {
        let game_id = engine.game_id().clone();
        let mut games = self.games.write().await;
        if games.contains_key(&game_id) {
            return Err(RegistryError::AlreadyExists(game_id));
        }
        self.forward_events(&mut engine);
        let handle = Arc::new(RwLock::new(engine));
        games.insert(game_id, handle.clone());
        Ok(handle)
    }

    fn forward_events(&self, engine: &mut GameEngine) {
        let tx = self.events_tx.clone();
        let game_id = engine.game_id().clone();
        engine.subscribe(move |event| {
            // No subscribers is fine
            let _ = tx.send((game_id.clone(), event.clone()));
        });
    }

    /// Get a game's engine.
    pub async fn get(&self, game_id: &GameId) -> Option<EngineHandle> {
        self.games.read().await.get(game_id).cloned()
    }

    /// Resolve a round for one game under its write lock.
    pub async fn process_round(
        &self,
        game_id: &GameId,
        event: &RoundEvent,
    ) -> Result<RoundOutcome, RegistryError> {
        let handle = self
            .get(game_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(game_id.clone()))?;
        let mut engine = handle.write().await;
        let outcome = engine.process_round(event)?;
        debug!(game_id = %game_id, round = event.round_number, "round processed");
        Ok(outcome)
    }

    /// Consistent copy of a game's state.
    pub async fn snapshot(&self, game_id: &GameId) -> Option<GameState> {
        let handle = self.get(game_id).await?;
        let engine = handle.read().await;
        Some(engine.state().clone())
    }

    /// Receive notifications from every game.
    pub fn subscribe(&self) -> broadcast::Receiver<(GameId, GameEvent)> {
        self.events_tx.subscribe()
    }

    /// Drop a game.
    pub async fn remove(&self, game_id: &GameId) -> Option<EngineHandle> {
        let removed = self.games.write().await.remove(game_id);
        if removed.is_some() {
            info!(game_id = %game_id, "game removed");
        }
        removed
    }

    /// Number of registered games.
    pub async fn game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Registered game IDs in order.
    pub async fn game_ids(&self) -> Vec<GameId> {
        self.games.read().await.keys().cloned().collect()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
