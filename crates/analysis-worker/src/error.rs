//! Worker error types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine query exceeded {0:?}")]
    EngineTimeout(Duration),

    #[error("Stockfish error: {0}")]
    Engine(String),

    #[error("Parse error: {0}")]
    Parse(#[from] chess_core::ChessCoreError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No games found for this user")]
    NoGames,
}
