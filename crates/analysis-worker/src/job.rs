//! Job runner: one batch of a user's games from request to terminal status

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::cache;
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::evaluator::EvaluatorFactory;
use crate::scheduler::BatchScheduler;
use crate::sink::ResultSink;
use crate::source::FetchedGame;
use crate::types::{AnalysisTask, GameAnalysisResult, TaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    #[default]
    Lichess,
    ChessCom,
}

impl Platform {
    /// Directory name under the games root
    pub fn dir_name(self) -> &'static str {
        match self {
            Platform::Lichess => "lichess",
            Platform::ChessCom => "chess_com",
        }
    }
}

fn default_game_limit() -> usize {
    10
}

fn default_analysis_depth() -> u32 {
    15
}

/// Job request body. Accepts snake_case and camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_game_limit", alias = "gameLimit")]
    pub game_limit: usize,
    #[serde(default = "default_analysis_depth", alias = "analysisDepth")]
    pub analysis_depth: u32,
}

impl Default for JobPayload {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            username: String::new(),
            game_limit: default_game_limit(),
            analysis_depth: default_analysis_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub id: String,
    pub user_id: String,
    pub payload: JobPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Analyzed,
    Fetched,
    Skipped,
    Cached,
}

/// Per-game line of the job summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub game_id: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_white: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_black: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GameOutcome {
    fn from_result(status: OutcomeStatus, result: &GameAnalysisResult) -> Self {
        Self {
            game_id: result.game_id.clone(),
            status,
            accuracy_white: result.metrics.as_ref().map(|m| m.accuracy_white),
            accuracy_black: result.metrics.as_ref().map(|m| m.accuracy_black),
            error: None,
        }
    }

    fn failed(status: OutcomeStatus, error: &TaskError) -> Self {
        Self {
            game_id: error.game_id.clone(),
            status,
            accuracy_white: None,
            accuracy_black: None,
            error: Some(error.message.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total_games: usize,
    pub analyses: Vec<GameOutcome>,
    pub platform: Platform,
    pub username: String,
    pub completed_at: DateTime<Utc>,
}

impl JobSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.analyses.iter().filter(|a| a.status == status).count()
    }
}

/// Run one job end to end and record its terminal status in `sink`.
///
/// Failures after the job is marked `RUNNING` are reported to the sink as `FAILED`
/// before being returned.
pub async fn run_job<F, S>(
    job: &JobRef,
    games: &[FetchedGame],
    factory: Arc<F>,
    sink: &S,
    config: &WorkerConfig,
) -> Result<JobSummary, WorkerError>
where
    F: EvaluatorFactory,
    S: ResultSink,
{
    info!(job_id = %job.id, games = games.len(), "Running job");
    sink.mark_job_status(&job.id, JobStatus::Running, None).await?;

    if games.is_empty() {
        return fail(sink, job, WorkerError::NoGames).await;
    }

    if let Err(e) = factory.probe().await {
        return fail(sink, job, e).await;
    }

    let by_id: HashMap<&str, &FetchedGame> =
        games.iter().map(|g| (g.game_id.as_str(), g)).collect();
    let ids: Vec<String> = games.iter().map(|g| g.game_id.clone()).collect();

    let split = match cache::partition(&ids, sink).await {
        Ok(split) => split,
        Err(e) => return fail(sink, job, e).await,
    };
    let total_games = split.already_analyzed.len() + split.needs_analysis.len();

    let mut analyses = Vec::with_capacity(total_games);
    let mut pending = split.needs_analysis;
    for game_id in &split.already_analyzed {
        match sink.load(game_id).await {
            Ok(Some(cached)) => {
                analyses.push(GameOutcome::from_result(OutcomeStatus::Cached, &cached));
            }
            // Vanished between the gate and the load
            Ok(None) => pending.push(game_id.clone()),
            Err(e) => return fail(sink, job, e).await,
        }
    }
    info!(
        job_id = %job.id,
        cached = analyses.len(),
        pending = pending.len(),
        "Cache gate applied"
    );

    let tasks: Vec<AnalysisTask> = pending
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|game| AnalysisTask {
            game_id: game.game_id.clone(),
            pgn: game.pgn.clone(),
            depth: job.payload.analysis_depth,
        })
        .collect();

    let scheduler = BatchScheduler::with_shared(factory, config.max_workers);
    let mut outcomes = scheduler.run(tasks);

    while let Some(outcome) = outcomes.next().await {
        let (stored, line) = match outcome {
            Ok(result) => {
                let line = GameOutcome::from_result(OutcomeStatus::Analyzed, &result);
                let result = match by_id.get(result.game_id.as_str()) {
                    Some(game) => result.with_platform(game.platform),
                    None => result,
                };
                (Some(result), line)
            }
            Err(task_error) if task_error.degrades_to_fetched() => {
                warn!(
                    job_id = %job.id,
                    game_id = %task_error.game_id,
                    kind = ?task_error.kind,
                    error = %task_error.message,
                    "Engine analysis failed, keeping raw game"
                );
                let fetched = by_id
                    .get(task_error.game_id.as_str())
                    .map(|game| game.fetched_result());
                (fetched, GameOutcome::failed(OutcomeStatus::Fetched, &task_error))
            }
            Err(task_error) => {
                warn!(
                    job_id = %job.id,
                    game_id = %task_error.game_id,
                    error = %task_error.message,
                    "Skipping unparsable game"
                );
                (None, GameOutcome::failed(OutcomeStatus::Skipped, &task_error))
            }
        };

        if let Some(result) = stored {
            if let Err(e) = sink.store(&result.game_id, &result).await {
                // No engine may outlive the failed job
                outcomes.cancel().await;
                return fail(sink, job, e).await;
            }
        }
        analyses.push(line);
    }

    let summary = JobSummary {
        total_games,
        analyses,
        platform: job.payload.platform,
        username: job.payload.username.clone(),
        completed_at: Utc::now(),
    };

    let payload = match serde_json::to_value(&summary) {
        Ok(payload) => payload,
        Err(e) => return fail(sink, job, e.into()).await,
    };
    sink.mark_job_status(&job.id, JobStatus::Completed, Some(&payload))
        .await?;

    info!(
        job_id = %job.id,
        analyzed = summary.count(OutcomeStatus::Analyzed),
        fetched = summary.count(OutcomeStatus::Fetched),
        cached = summary.count(OutcomeStatus::Cached),
        skipped = summary.count(OutcomeStatus::Skipped),
        "Job completed"
    );
    Ok(summary)
}

async fn fail<S: ResultSink>(
    sink: &S,
    job: &JobRef,
    error: WorkerError,
) -> Result<JobSummary, WorkerError> {
    error!(job_id = %job.id, error = %error, "Job failed");
    let payload = json!({ "error": error.to_string() });
    if let Err(e) = sink
        .mark_job_status(&job.id, JobStatus::Failed, Some(&payload))
        .await
    {
        warn!(job_id = %job.id, error = %e, "Could not record job failure");
    }
    Err(error)
}
