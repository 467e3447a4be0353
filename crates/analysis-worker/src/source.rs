//! Game sources: where a job's PGNs come from

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::PathBuf;

use chess_core::pgn::{parse_metadata, split_games};
use chess_core::GameMetadata;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::job::Platform;
use crate::types::GameAnalysisResult;

/// A recorded game as delivered by a source, before analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedGame {
    pub game_id: String,
    pub pgn: String,
    pub platform: Platform,
    pub metadata: GameMetadata,
}

impl FetchedGame {
    /// Build from PGN text. Tags are read without validating the movetext, so
    /// malformed games still reach the analyzer and get reported there.
    pub fn from_pgn(platform: Platform, pgn: &str) -> Self {
        let metadata = parse_metadata(pgn);
        let game_id = metadata
            .link
            .as_deref()
            .and_then(last_path_segment)
            .unwrap_or_else(|| content_id(pgn));

        Self {
            game_id,
            pgn: pgn.to_string(),
            platform,
            metadata,
        }
    }

    /// Result carrying only the raw game data
    pub fn fetched_result(&self) -> GameAnalysisResult {
        GameAnalysisResult::fetched(&self.game_id, &self.metadata).with_platform(self.platform)
    }
}

fn last_path_segment(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(String::from)
}

fn content_id(pgn: &str) -> String {
    let mut hasher = DefaultHasher::new();
    pgn.trim().hash(&mut hasher);
    format!("pgn-{:016x}", hasher.finish())
}

pub trait GameSource: Send + Sync {
    fn fetch(
        &self,
        platform: Platform,
        username: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FetchedGame>, WorkerError>> + Send;
}

/// Reads `<root>/<platform>/<username>.pgn`
#[derive(Debug, Clone)]
pub struct PgnDirectorySource {
    root: PathBuf,
}

impl PgnDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, platform: Platform, username: &str) -> PathBuf {
        self.root
            .join(platform.dir_name())
            .join(format!("{username}.pgn"))
    }
}

impl GameSource for PgnDirectorySource {
    async fn fetch(
        &self,
        platform: Platform,
        username: &str,
        limit: usize,
    ) -> Result<Vec<FetchedGame>, WorkerError> {
        let path = self.path_for(platform, username);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No game file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let games: Vec<FetchedGame> = split_games(&text)
            .iter()
            .take(limit)
            .map(|pgn| FetchedGame::from_pgn(platform, pgn))
            .collect();
        info!(username, platform = ?platform, count = games.len(), "Loaded games");
        Ok(games)
    }
}
