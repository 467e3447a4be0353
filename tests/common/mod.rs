#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_worker::evaluator::{Evaluation, EvaluatorFactory, PositionEvaluator, Score};
use analysis_worker::job::{GameOutcome, JobStatus};
use analysis_worker::sink::{MemorySink, ResultSink};
use analysis_worker::types::GameAnalysisResult;
use analysis_worker::WorkerError;
use serde_json::Value as JsonValue;

/// Ruy Lopez, Chigorin: the first 21 moves (42 plies).
pub const RUY_LOPEZ_42: &str = r#"[Event "Casual Game"]
[Site "https://lichess.org/RuyLopez42"]
[White "Player1"]
[Black "Player2"]
[Result "*"]
[ECO "C98"]
[Opening "Ruy Lopez: Closed, Chigorin Defense"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 6. Re1 b5 7. Bb3 d6
8. c3 O-O 9. h3 Na5 10. Bc2 c5 11. d4 Qc7 12. Nbd2 cxd4 13. cxd4 Nc6
14. Nb3 a5 15. Be3 a4 16. Nbd2 Bd7 17. Rc1 Qb7 18. Bb1 Rfc8 19. d5 Nb4
20. Rxc8+ Rxc8 21. a3 Na6 *
"#;

/// Short game with a lichess-style id
pub fn short_game(id: &str) -> String {
    format!("[Site \"https://lichess.org/{id}\"]\n[White \"w-{id}\"]\n[Black \"b-{id}\"]\n\n1. e4 e5 2. Nf3 Nc6 *\n")
}

/// Replays a fixed reply list from the start on every spawned engine.
pub struct ScriptedEvaluator {
    replies: Arc<Vec<Evaluation>>,
    cursor: usize,
}

impl PositionEvaluator for ScriptedEvaluator {
    async fn evaluate(&mut self, _fen: &str, _depth: u32) -> Result<Evaluation, WorkerError> {
        let reply = self
            .replies
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| WorkerError::Engine("script exhausted".into()))?;
        self.cursor += 1;
        Ok(reply)
    }

    async fn shutdown(self) {}
}

pub struct ScriptedFactory {
    replies: Arc<Vec<Evaluation>>,
}

impl ScriptedFactory {
    /// Build a consistent eval trajectory: ply `i` sees `evals[i]` before and
    /// `evals[i + 1]` after. `best` maps ply index to the suggested UCI move.
    pub fn from_trajectory(evals: &[i32], best: &[(usize, &str)]) -> Self {
        let mut replies = Vec::new();
        for ply in 0..evals.len().saturating_sub(1) {
            let best_move = best
                .iter()
                .find(|(i, _)| *i == ply)
                .map(|(_, mv)| mv.to_string());
            replies.push(Evaluation {
                score: Score(evals[ply]),
                best_move,
            });
            replies.push(Evaluation {
                score: Score(evals[ply + 1]),
                best_move: None,
            });
        }
        Self {
            replies: Arc::new(replies),
        }
    }
}

impl EvaluatorFactory for ScriptedFactory {
    type Evaluator = ScriptedEvaluator;

    async fn spawn(&self) -> Result<ScriptedEvaluator, WorkerError> {
        Ok(ScriptedEvaluator {
            replies: Arc::clone(&self.replies),
            cursor: 0,
        })
    }
}

/// Counts live engine handles and how many were ever started.
#[derive(Default)]
pub struct Gauge {
    pub open: AtomicUsize,
    pub peak: AtomicUsize,
    pub spawned: AtomicUsize,
}

impl Gauge {
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

pub struct CountingEvaluator {
    gauge: Arc<Gauge>,
    delay: Duration,
    fail_fen: Option<String>,
}

impl PositionEvaluator for CountingEvaluator {
    async fn evaluate(&mut self, fen: &str, _depth: u32) -> Result<Evaluation, WorkerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_fen.as_deref().is_some_and(|f| fen.contains(f)) {
            return Err(WorkerError::EngineTimeout(Duration::from_millis(5)));
        }
        Ok(Evaluation {
            score: Score(15),
            best_move: None,
        })
    }

    async fn shutdown(self) {}
}

impl Drop for CountingEvaluator {
    fn drop(&mut self) {
        self.gauge.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Flat-eval engine stub. Optionally times out on positions containing `fail_fen`.
pub struct CountingFactory {
    pub gauge: Arc<Gauge>,
    pub delay: Duration,
    pub fail_fen: Option<String>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            gauge: Arc::new(Gauge::default()),
            delay: Duration::ZERO,
            fail_fen: None,
        }
    }
}

impl EvaluatorFactory for CountingFactory {
    type Evaluator = CountingEvaluator;

    async fn spawn(&self) -> Result<CountingEvaluator, WorkerError> {
        self.gauge.spawned.fetch_add(1, Ordering::SeqCst);
        let open = self.gauge.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(open, Ordering::SeqCst);
        Ok(CountingEvaluator {
            gauge: Arc::clone(&self.gauge),
            delay: self.delay,
            fail_fen: self.fail_fen.clone(),
        })
    }
}

/// No engine binary available
pub struct UnavailableFactory;

impl EvaluatorFactory for UnavailableFactory {
    type Evaluator = ScriptedEvaluator;

    async fn spawn(&self) -> Result<ScriptedEvaluator, WorkerError> {
        Err(WorkerError::EngineUnavailable("stockfish not installed".into()))
    }
}

/// Memory sink whose writes always fail
#[derive(Clone, Default)]
pub struct RejectingSink {
    pub inner: MemorySink,
}

impl ResultSink for RejectingSink {
    async fn has_analyzed(&self, game_id: &str) -> Result<bool, WorkerError> {
        self.inner.has_analyzed(game_id).await
    }

    async fn load(&self, game_id: &str) -> Result<Option<GameAnalysisResult>, WorkerError> {
        self.inner.load(game_id).await
    }

    async fn store(&self, game_id: &str, _result: &GameAnalysisResult) -> Result<(), WorkerError> {
        Err(WorkerError::Store(format!("disk full writing {game_id}")))
    }

    async fn mark_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&JsonValue>,
    ) -> Result<(), WorkerError> {
        self.inner.mark_job_status(job_id, status, result).await
    }
}

pub fn outcome_for<'a>(analyses: &'a [GameOutcome], game_id: &str) -> &'a GameOutcome {
    analyses
        .iter()
        .find(|a| a.game_id == game_id)
        .unwrap_or_else(|| panic!("no outcome for {game_id}"))
}
