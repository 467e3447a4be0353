//! Batch chess game analysis over an external UCI engine.

pub mod analysis;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod job;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod stockfish;
pub mod types;

pub use error::WorkerError;
