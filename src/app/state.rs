//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::server::GameSettings;
use crate::game::{GameHandle, GameServer};
use crate::util::rate_limit::{create_limiter, Limiter, JOIN_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: GameHandle,
    pub join_limiter: Arc<Limiter>,
}

impl AppState {
    /// Build the state and start the game task (requires a Tokio runtime)
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Start the authoritative game loop
        let game = GameServer::spawn(GameSettings::from_config(&config));

        Self {
            config,
            game,
            join_limiter: create_limiter(JOIN_RATE_LIMIT),
        }
    }
}
