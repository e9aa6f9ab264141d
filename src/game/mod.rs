//! Game simulation modules

pub mod physics;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod world;

pub use server::{GameHandle, GameServer};

/// Errors reported synchronously to the caller of a game operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Access key mismatch")]
    Forbidden,

    #[error("Unknown session token")]
    Unauthenticated,

    #[error("Too many requests")]
    RateLimited,

    #[error("Game server unavailable")]
    Unavailable,
}
