//! Result sink: durable home for per-game results and job outcomes

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::error::WorkerError;
use crate::job::JobStatus;
use crate::types::GameAnalysisResult;

/// Storage for analysis results. Must accept concurrent writes for distinct games.
pub trait ResultSink: Send + Sync {
    /// True only when a prior result with status `analyzed` exists.
    fn has_analyzed(&self, game_id: &str) -> impl Future<Output = Result<bool, WorkerError>> + Send;

    fn load(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<Option<GameAnalysisResult>, WorkerError>> + Send;

    fn store(
        &self,
        game_id: &str,
        result: &GameAnalysisResult,
    ) -> impl Future<Output = Result<(), WorkerError>> + Send;

    /// `result` replaces the job's stored payload when present.
    fn mark_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&JsonValue>,
    ) -> impl Future<Output = Result<(), WorkerError>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    pub result: Option<JsonValue>,
}

#[derive(Default)]
struct MemoryState {
    results: HashMap<String, GameAnalysisResult>,
    jobs: HashMap<String, Vec<JobStatusUpdate>>,
    stores: usize,
}

/// In-process sink for local runs and tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a prior result without counting it as a store.
    pub async fn insert(&self, result: GameAnalysisResult) {
        let mut state = self.state.lock().await;
        state.results.insert(result.game_id.clone(), result);
    }

    pub async fn results(&self) -> HashMap<String, GameAnalysisResult> {
        self.state.lock().await.results.clone()
    }

    /// Number of `store` calls so far
    pub async fn store_count(&self) -> usize {
        self.state.lock().await.stores
    }

    pub async fn job_history(&self, job_id: &str) -> Vec<JobStatusUpdate> {
        self.state
            .lock()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    async fn has_analyzed(&self, game_id: &str) -> Result<bool, WorkerError> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .get(game_id)
            .is_some_and(GameAnalysisResult::is_analyzed))
    }

    async fn load(&self, game_id: &str) -> Result<Option<GameAnalysisResult>, WorkerError> {
        Ok(self.state.lock().await.results.get(game_id).cloned())
    }

    async fn store(&self, game_id: &str, result: &GameAnalysisResult) -> Result<(), WorkerError> {
        let mut state = self.state.lock().await;
        state.stores += 1;
        state.results.insert(game_id.to_string(), result.clone());
        Ok(())
    }

    async fn mark_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&JsonValue>,
    ) -> Result<(), WorkerError> {
        let mut state = self.state.lock().await;
        state
            .jobs
            .entry(job_id.to_string())
            .or_default()
            .push(JobStatusUpdate {
                status,
                result: result.cloned(),
            });
        Ok(())
    }
}
