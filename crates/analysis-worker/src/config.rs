//! Worker configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::WorkerError;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Database connection URL (service mode only)
    pub database_url: Option<String>,

    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Default search depth when a job does not specify one
    pub analysis_depth: u32,

    /// Maximum number of concurrently running engine processes
    pub max_workers: usize,

    /// Wall-clock budget for a single engine query
    pub query_timeout: Duration,

    /// Stockfish `Threads` option
    pub engine_threads: u32,

    /// Stockfish `Hash` option in MB
    pub engine_hash_mb: u32,

    /// Root directory holding `<platform>/<username>.pgn` game files
    pub games_dir: PathBuf,

    /// Sleep between job polls when the queue is empty
    pub poll_interval: Duration,

    /// Consecutive empty polls before exiting (None = poll forever)
    pub max_empty_polls: Option<u32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            analysis_depth: 15,
            max_workers: 2,
            query_timeout: Duration::from_secs(30),
            engine_threads: 1,
            engine_hash_mb: 256,
            games_dir: PathBuf::from("games"),
            poll_interval: Duration::from_secs(3),
            max_empty_polls: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        let cpus = num_cpus::get();
        if config.max_workers > cpus {
            warn!(
                max_workers = config.max_workers,
                cpus, "MAX_WORKERS exceeds available CPUs; engines will compete for cores"
            );
        }
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let analysis_depth = parsed(&lookup, "ANALYSIS_DEPTH").unwrap_or(defaults.analysis_depth);
        if analysis_depth == 0 {
            return Err(WorkerError::Config("ANALYSIS_DEPTH must be positive".into()));
        }

        let max_workers = parsed(&lookup, "MAX_WORKERS").unwrap_or(defaults.max_workers);
        if max_workers == 0 {
            return Err(WorkerError::Config("MAX_WORKERS must be positive".into()));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            stockfish_path: lookup("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path),
            analysis_depth,
            max_workers,
            query_timeout: parsed(&lookup, "QUERY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.query_timeout),
            engine_threads: parsed(&lookup, "ENGINE_THREADS").unwrap_or(defaults.engine_threads),
            engine_hash_mb: parsed(&lookup, "ENGINE_HASH_MB").unwrap_or(defaults.engine_hash_mb),
            games_dir: lookup("GAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.games_dir),
            poll_interval: parsed(&lookup, "POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_empty_polls: parsed(&lookup, "MAX_EMPTY_POLLS"),
        })
    }

    /// Database URL, required in service mode.
    pub fn require_database_url(&self) -> Result<&str, WorkerError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| WorkerError::Config("DATABASE_URL not set".into()))
    }
}

/// Parse a variable into its target type; out-of-range or malformed values read as unset.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
