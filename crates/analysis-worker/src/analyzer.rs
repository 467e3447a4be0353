//! Per-game analysis: two evaluations per ply, classification and aggregation
//!
//! One `GameAnalyzer` owns one evaluator for the lifetime of one game.

use chess_core::pgn::parse_pgn;
use chess_core::{describe_uci, replay, Ply, Side};
use tracing::{debug, info, warn};

use crate::analysis::{
    average_cp_loss, calculate_accuracy, calculate_cp_loss, classify_move, is_critical,
    CappedList, Classification, ClassificationCounts,
};
use crate::error::WorkerError;
use crate::evaluator::{Evaluation, PositionEvaluator};
use crate::types::{
    AnalysisTask, BestMoveHighlight, CriticalMoment, GameAnalysisResult, GameMetrics,
    MoveHighlight, MoveRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Init,
    /// Waiting on the evaluator for this ply
    Evaluating { ply: usize },
    Done,
    Failed,
}

pub struct GameAnalyzer<E> {
    evaluator: E,
    state: AnalyzerState,
}

impl<E: PositionEvaluator> GameAnalyzer<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            state: AnalyzerState::Init,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    /// Hand the evaluator back so the caller can shut it down.
    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    /// Analyze one game. Any evaluator or parse failure leaves the analyzer `Failed`.
    pub async fn analyze(&mut self, task: &AnalysisTask) -> Result<GameAnalysisResult, WorkerError> {
        match self.run(task).await {
            Ok(result) => {
                self.state = AnalyzerState::Done;
                Ok(result)
            }
            Err(e) => {
                warn!(game_id = %task.game_id, state = ?self.state, error = %e, "Analysis failed");
                self.state = AnalyzerState::Failed;
                Err(e)
            }
        }
    }

    async fn run(&mut self, task: &AnalysisTask) -> Result<GameAnalysisResult, WorkerError> {
        let game = parse_pgn(&task.pgn)?;
        let plies = replay(&game.moves)?;

        info!(
            game_id = %task.game_id,
            plies = plies.len(),
            depth = task.depth,
            "Starting analysis"
        );

        let mut tally = GameTally::default();
        for ply in &plies {
            self.state = AnalyzerState::Evaluating { ply: ply.index };

            let before = self.evaluator.evaluate(&ply.fen_before, task.depth).await?;
            let after = self.evaluator.evaluate(&ply.fen_after, task.depth).await?;

            let record = build_record(ply, &before, &after);
            debug!(
                game_id = %task.game_id,
                ply = ply.index,
                san = %record.move_san,
                loss = record.centipawn_loss,
                classification = %record.classification,
                "Move classified"
            );
            tally.push(record);
        }

        let metrics = tally.finish();
        info!(
            game_id = %task.game_id,
            accuracy_white = metrics.accuracy_white,
            accuracy_black = metrics.accuracy_black,
            "Analysis complete"
        );

        Ok(GameAnalysisResult::analyzed(
            &task.game_id,
            &game.metadata,
            metrics,
        ))
    }
}

fn build_record(ply: &Ply, before: &Evaluation, after: &Evaluation) -> MoveRecord {
    let loss = calculate_cp_loss(before.score, after.score, ply.mover == Side::White);

    // Fall back to the played move when the engine has no suggestion
    let best = before
        .best_move
        .as_deref()
        .and_then(|uci| describe_uci(&ply.fen_before, uci));
    let (best_move_san, best_move_uci) = match best {
        Some(notation) => (notation.san, notation.uci),
        None => (ply.san.clone(), ply.uci.clone()),
    };

    MoveRecord {
        ply: ply.index,
        move_number: ply.index / 2 + 1,
        move_san: ply.san.clone(),
        move_uci: ply.uci.clone(),
        side: ply.mover,
        eval_before: before.score,
        eval_after: after.score,
        best_move_san,
        best_move_uci,
        centipawn_loss: loss,
        classification: classify_move(loss),
        position_fen: ply.fen_before.clone(),
    }
}

/// Running per-game statistics, fed in ply order.
#[derive(Default)]
struct GameTally {
    white_losses: Vec<u32>,
    black_losses: Vec<u32>,
    white_counts: ClassificationCounts,
    black_counts: ClassificationCounts,
    mistakes: CappedList<MoveHighlight>,
    blunders: CappedList<MoveHighlight>,
    best_moves: CappedList<BestMoveHighlight>,
    critical_moments: CappedList<CriticalMoment>,
    records: Vec<MoveRecord>,
}

impl GameTally {
    fn push(&mut self, record: MoveRecord) {
        match record.side {
            Side::White => {
                self.white_losses.push(record.centipawn_loss);
                self.white_counts.record(record.classification);
            }
            Side::Black => {
                self.black_losses.push(record.centipawn_loss);
                self.black_counts.record(record.classification);
            }
        }

        match record.classification {
            Classification::Mistake => {
                self.mistakes.push(record.highlight());
            }
            Classification::Blunder => {
                self.blunders.push(record.highlight());
            }
            Classification::Best => {
                self.best_moves.push(record.best_move_highlight());
            }
            _ => {}
        }

        if is_critical(record.eval_before, record.eval_after) {
            self.critical_moments.push(record.critical_moment());
        }

        self.records.push(record);
    }

    fn finish(self) -> GameMetrics {
        GameMetrics {
            accuracy_white: calculate_accuracy(&self.white_losses),
            accuracy_black: calculate_accuracy(&self.black_losses),
            avg_cp_loss_white: average_cp_loss(&self.white_losses),
            avg_cp_loss_black: average_cp_loss(&self.black_losses),
            classifications_white: self.white_counts,
            classifications_black: self.black_counts,
            total_moves: self.records.len(),
            mistakes: self.mistakes.into_vec(),
            blunders: self.blunders.into_vec(),
            best_moves: self.best_moves.into_vec(),
            critical_moments: self.critical_moments.into_vec(),
            move_analyses: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::evaluator::Score;
    use crate::types::AnalysisStatus;

    const FOOLS_MATE: &str = r#"[White "alice"]
[Black "bob"]
[Result "0-1"]
[ECO "A00"]

1. f3 e5 2. g4 Qh4# 0-1
"#;

    struct Scripted {
        replies: VecDeque<Evaluation>,
        calls: usize,
        fail_on_call: Option<usize>,
    }

    impl Scripted {
        fn new(replies: &[(i32, Option<&str>)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(cp, mv)| Evaluation {
                        score: Score(*cp),
                        best_move: mv.map(String::from),
                    })
                    .collect(),
                calls: 0,
                fail_on_call: None,
            }
        }
    }

    impl PositionEvaluator for Scripted {
        async fn evaluate(&mut self, _fen: &str, _depth: u32) -> Result<Evaluation, WorkerError> {
            self.calls += 1;
            if self.fail_on_call == Some(self.calls) {
                return Err(WorkerError::EngineTimeout(Duration::from_secs(1)));
            }
            self.replies
                .pop_front()
                .ok_or_else(|| WorkerError::Engine("script exhausted".into()))
        }

        async fn shutdown(self) {}
    }

    fn task(pgn: &str) -> AnalysisTask {
        AnalysisTask {
            game_id: "fools".into(),
            pgn: pgn.into(),
            depth: 12,
        }
    }

    fn fools_mate_script() -> Scripted {
        Scripted::new(&[
            // 1. f3
            (20, Some("e2e4")),
            (-60, None),
            // 1... e5
            (-60, Some("e7e5")),
            (-50, None),
            // 2. g4
            (-50, Some("g1h3")),
            (-9990, None),
            // 2... Qh4#
            (-9990, Some("d8h4")),
            (-10000, None),
        ])
    }

    #[tokio::test]
    async fn test_fools_mate_metrics() {
        let mut analyzer = GameAnalyzer::new(fools_mate_script());
        assert_eq!(analyzer.state(), AnalyzerState::Init);

        let result = analyzer.analyze(&task(FOOLS_MATE)).await.unwrap();
        assert_eq!(analyzer.state(), AnalyzerState::Done);
        assert_eq!(analyzer.into_evaluator().calls, 8);

        assert_eq!(result.status, AnalysisStatus::Analyzed);
        assert_eq!(result.white, "alice");
        assert_eq!(result.result, "0-1");
        assert_eq!(result.opening.as_deref(), Some("A00"));

        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.total_moves, 4);
        assert_eq!(metrics.move_analyses.len(), 4);
        assert_eq!(metrics.accuracy_white, 0.0);
        assert_eq!(metrics.accuracy_black, 97.5);
        assert_eq!(metrics.avg_cp_loss_white, 5010.0);
        assert_eq!(metrics.avg_cp_loss_black, 5.0);
        assert_eq!(metrics.classifications_white.good, 1);
        assert_eq!(metrics.classifications_white.blunder, 1);
        assert_eq!(metrics.classifications_black.best, 2);

        let losses: Vec<u32> = metrics.move_analyses.iter().map(|m| m.centipawn_loss).collect();
        assert_eq!(losses, vec![80, 10, 9940, 0]);

        assert_eq!(metrics.blunders.len(), 1);
        assert_eq!(metrics.blunders[0].played, "g4");
        assert_eq!(metrics.blunders[0].best, "Nh3");
        assert_eq!(metrics.blunders[0].move_number, 2);
        assert_eq!(metrics.blunders[0].player, Side::White);

        let best: Vec<&str> = metrics.best_moves.iter().map(|b| b.played.as_str()).collect();
        assert_eq!(best, vec!["e5", "Qh4#"]);

        assert_eq!(metrics.critical_moments.len(), 1);
        assert_eq!(metrics.critical_moments[0].eval_change, -9940);
        assert!(metrics.mistakes.is_empty());

        let mate = &metrics.move_analyses[3];
        assert_eq!(mate.best_move_san, "Qh4#");
        assert_eq!(mate.best_move_uci, "d8h4");
        assert_eq!(mate.move_uci, "d8h4");
    }

    #[tokio::test]
    async fn test_missing_best_move_uses_played_move() {
        let script = Scripted::new(&[
            (20, None),
            (20, None),
            (20, Some("a1a1")),
            (20, None),
            (20, None),
            (20, None),
            (20, None),
            (20, None),
        ]);
        let mut analyzer = GameAnalyzer::new(script);
        let metrics = analyzer.analyze(&task(FOOLS_MATE)).await.unwrap().metrics.unwrap();

        let first = &metrics.move_analyses[0];
        assert_eq!(first.best_move_san, "f3");
        assert_eq!(first.best_move_uci, "f2f3");
        // Illegal suggestion is ignored as well
        assert_eq!(metrics.move_analyses[1].best_move_san, "e5");
        assert_eq!(metrics.accuracy_white, 100.0);
    }

    #[tokio::test]
    async fn test_evaluator_failure_mid_game() {
        let mut script = fools_mate_script();
        script.fail_on_call = Some(5);
        let mut analyzer = GameAnalyzer::new(script);

        let err = analyzer.analyze(&task(FOOLS_MATE)).await.unwrap_err();
        assert!(matches!(err, WorkerError::EngineTimeout(_)));
        assert_eq!(analyzer.state(), AnalyzerState::Failed);
    }

    #[tokio::test]
    async fn test_game_without_moves() {
        let pgn = "[White \"alice\"]\n[Black \"bob\"]\n[Result \"1-0\"]\n\n1-0\n";
        let mut analyzer = GameAnalyzer::new(fools_mate_script());

        let result = analyzer.analyze(&task(pgn)).await.unwrap();
        assert_eq!(analyzer.state(), AnalyzerState::Done);
        assert_eq!(analyzer.into_evaluator().calls, 0);

        assert_eq!(result.status, AnalysisStatus::Analyzed);
        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.total_moves, 0);
        assert_eq!(metrics.accuracy_white, 100.0);
        assert_eq!(metrics.accuracy_black, 100.0);
        assert_eq!(metrics.avg_cp_loss_white, 0.0);
        assert!(metrics.blunders.is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_skips_engine() {
        let mut analyzer = GameAnalyzer::new(fools_mate_script());
        let err = analyzer.analyze(&task("not a game")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Parse(_)));
        assert_eq!(analyzer.state(), AnalyzerState::Failed);
        assert_eq!(analyzer.into_evaluator().calls, 0);

        let mut analyzer = GameAnalyzer::new(fools_mate_script());
        let err = analyzer.analyze(&task("1. e4 e5 2. Ke3")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Parse(_)));
    }
}
