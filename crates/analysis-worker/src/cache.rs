//! Cache gate: split a batch into previously analyzed games and the rest

use std::collections::HashSet;

use tracing::debug;

use crate::error::WorkerError;
use crate::sink::ResultSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePartition {
    pub already_analyzed: Vec<String>,
    pub needs_analysis: Vec<String>,
}

/// Read-only partition of `game_ids`. Input order is kept; duplicates collapse.
pub async fn partition<S: ResultSink>(
    game_ids: &[String],
    sink: &S,
) -> Result<CachePartition, WorkerError> {
    let mut seen = HashSet::new();
    let mut split = CachePartition::default();

    for game_id in game_ids {
        if !seen.insert(game_id.as_str()) {
            continue;
        }
        if sink.has_analyzed(game_id).await? {
            split.already_analyzed.push(game_id.clone());
        } else {
            split.needs_analysis.push(game_id.clone());
        }
    }

    debug!(
        cached = split.already_analyzed.len(),
        pending = split.needs_analysis.len(),
        "Cache gate"
    );
    Ok(split)
}
