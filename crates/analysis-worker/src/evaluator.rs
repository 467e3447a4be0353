//! Position evaluator seam between the analyzer and an engine process.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Base value for a forced mate; each ply to mate costs `MATE_STEP`.
pub const MATE_SCORE: i32 = 10_000;
const MATE_STEP: i32 = 10;

/// Scores beyond this magnitude encode a forced mate.
pub const MATE_THRESHOLD: i32 = 9_000;

/// Evaluation in centipawns from white's perspective, with mates folded in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(pub i32);

impl Score {
    /// Convert an engine report (side-to-move perspective) to white's perspective.
    ///
    /// Mate in `n > 0` maps to `10000 - 10n`, mate in `n < 0` to `-10000 - 10n`.
    /// `mate 0` means the side to move is already mated.
    pub fn from_engine(cp: Option<i32>, mate: Option<i32>, white_to_move: bool) -> Self {
        let relative = match (mate, cp) {
            (Some(0), _) => -MATE_SCORE,
            (Some(m), _) if m > 0 => MATE_SCORE.saturating_sub(m.saturating_mul(MATE_STEP)),
            (Some(m), _) => (-MATE_SCORE).saturating_sub(m.saturating_mul(MATE_STEP)),
            (None, Some(c)) => c,
            (None, None) => 0,
        };
        if white_to_move {
            Score(relative)
        } else {
            Score(relative.saturating_neg())
        }
    }

    pub fn is_mate(self) -> bool {
        self.0.abs() > MATE_THRESHOLD
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a single position evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub score: Score,
    /// First move of the principal variation, in UCI notation
    pub best_move: Option<String>,
}

/// One engine instance, owned by exactly one game analysis at a time.
///
/// Futures are `Send` so analyzers can run on spawned tasks.
pub trait PositionEvaluator: Send {
    /// Evaluate `fen` to exactly `depth` plies.
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<Evaluation, WorkerError>> + Send;

    /// Terminate the engine process.
    fn shutdown(self) -> impl Future<Output = ()> + Send;
}

/// Starts engine instances for the scheduler.
pub trait EvaluatorFactory: Send + Sync + 'static {
    type Evaluator: PositionEvaluator + 'static;

    fn spawn(&self) -> impl Future<Output = Result<Self::Evaluator, WorkerError>> + Send;

    /// Verify an engine can be started at all, releasing it immediately.
    fn probe(&self) -> impl Future<Output = Result<(), WorkerError>> + Send {
        async move {
            let evaluator = self.spawn().await?;
            evaluator.shutdown().await;
            Ok(())
        }
    }
}
