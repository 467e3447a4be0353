//! PostgreSQL queries for jobs and per-game analysis rows

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::debug;

use crate::error::WorkerError;
use crate::job::{JobPayload, JobRef, JobStatus};
use crate::sink::ResultSink;
use crate::source::FetchedGame;
use crate::types::GameAnalysisResult;

/// A queued job row as read from the database
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub user_id: String,
    pub payload: JsonValue,
}

impl QueuedJob {
    /// Decode the payload; missing fields take their defaults.
    pub fn into_job(self) -> Result<JobRef, WorkerError> {
        let payload: JobPayload = serde_json::from_value(self.payload)?;
        Ok(JobRef {
            id: self.id,
            user_id: self.user_id,
            payload,
        })
    }
}

/// Fetch the oldest queued job, if any
pub async fn fetch_queued_job(pool: &PgPool) -> Result<Option<QueuedJob>, WorkerError> {
    let row: Option<(String, String, Option<JsonValue>)> = sqlx::query_as(
        r#"SELECT id, "userId", payload FROM "Job"
           WHERE status = 'QUEUED'
           ORDER BY "createdAt" ASC
           LIMIT 1"#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, user_id, payload)| QueuedJob {
        id,
        user_id,
        payload: payload.unwrap_or(JsonValue::Null),
    }))
}

/// Move a job from QUEUED to RUNNING. False if another worker got there first.
pub async fn claim_job(pool: &PgPool, job_id: &str) -> Result<bool, WorkerError> {
    let result = sqlx::query(
        r#"UPDATE "Job" SET status = 'RUNNING', "updatedAt" = now()
           WHERE id = $1 AND status = 'QUEUED'"#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Result sink scoped to one job of one user
#[derive(Clone)]
pub struct PgResultSink {
    pool: PgPool,
    job_id: String,
    user_id: String,
    pgns: HashMap<String, String>,
}

impl PgResultSink {
    pub fn new(pool: PgPool, job: &JobRef) -> Self {
        Self {
            pool,
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            pgns: HashMap::new(),
        }
    }

    /// Remember each game's PGN so stored rows carry it.
    pub fn with_games(mut self, games: &[FetchedGame]) -> Self {
        self.pgns.extend(
            games
                .iter()
                .map(|g| (g.game_id.clone(), g.pgn.clone())),
        );
        self
    }

    fn row_id(&self, game_id: &str) -> String {
        format!("{}_{}", self.job_id, game_id)
    }
}

impl ResultSink for PgResultSink {
    async fn has_analyzed(&self, game_id: &str) -> Result<bool, WorkerError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"SELECT 1 FROM "GameAnalysis"
               WHERE "userId" = $1 AND "gameId" = $2 AND result->>'status' = 'analyzed'
               LIMIT 1"#,
        )
        .bind(&self.user_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn load(&self, game_id: &str) -> Result<Option<GameAnalysisResult>, WorkerError> {
        let row: Option<(JsonValue,)> = sqlx::query_as(
            r#"SELECT result FROM "GameAnalysis"
               WHERE "userId" = $1 AND "gameId" = $2 AND result->>'status' = 'analyzed'
               ORDER BY "updatedAt" DESC
               LIMIT 1"#,
        )
        .bind(&self.user_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(value,)| serde_json::from_value(value))
            .transpose()
            .map_err(WorkerError::from)
    }

    async fn store(&self, game_id: &str, result: &GameAnalysisResult) -> Result<(), WorkerError> {
        let value = serde_json::to_value(result)?;
        let id = self.row_id(game_id);
        debug!(id = %id, "Storing game analysis");

        sqlx::query(
            r#"INSERT INTO "GameAnalysis"
                (id, "userId", "jobId", "gameId", pgn, result, "createdAt", "updatedAt")
               VALUES ($1, $2, $3, $4, $5, $6, now(), now())
               ON CONFLICT (id) DO UPDATE SET
                result = EXCLUDED.result,
                pgn = EXCLUDED.pgn,
                "updatedAt" = now()"#,
        )
        .bind(&id)
        .bind(&self.user_id)
        .bind(&self.job_id)
        .bind(game_id)
        .bind(self.pgns.get(game_id))
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(|e| WorkerError::Store(format!("{id}: {e}")))?;

        Ok(())
    }

    async fn mark_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&JsonValue>,
    ) -> Result<(), WorkerError> {
        // Status is a closed set of literals, inlined so it coerces to the column's enum type
        let sql = format!(
            r#"UPDATE "Job" SET status = '{}', result = COALESCE($2, result), "updatedAt" = now()
               WHERE id = $1"#,
            status.as_str()
        );
        sqlx::query(&sql)
            .bind(job_id)
            .bind(result)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
