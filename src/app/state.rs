//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::GameRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: GameRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = GameRegistry::new(config.game.clone());

        Self {
            config: Arc::new(config),
            registry,
        }
    }
}
