//! Records produced by game analysis

use std::fmt;

use chess_core::{GameMetadata, Side};
use serde::{Deserialize, Serialize};

use crate::analysis::{Classification, ClassificationCounts};
use crate::error::WorkerError;
use crate::evaluator::Score;
use crate::job::Platform;

/// One analyzed half-move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub ply: usize,
    pub move_number: usize,
    pub move_san: String,
    pub move_uci: String,
    pub side: Side,
    pub eval_before: Score,
    pub eval_after: Score,
    pub best_move_san: String,
    pub best_move_uci: String,
    pub centipawn_loss: u32,
    pub classification: Classification,
    /// Position before the move
    pub position_fen: String,
}

impl MoveRecord {
    pub fn highlight(&self) -> MoveHighlight {
        MoveHighlight {
            move_number: self.move_number,
            player: self.side,
            played: self.move_san.clone(),
            best: self.best_move_san.clone(),
            loss: self.centipawn_loss,
            position_fen: self.position_fen.clone(),
        }
    }

    pub fn best_move_highlight(&self) -> BestMoveHighlight {
        BestMoveHighlight {
            move_number: self.move_number,
            player: self.side,
            played: self.move_san.clone(),
            position_fen: self.position_fen.clone(),
        }
    }

    pub fn critical_moment(&self) -> CriticalMoment {
        CriticalMoment {
            move_number: self.move_number,
            player: self.side,
            eval_change: self.eval_after.0.saturating_sub(self.eval_before.0),
            position_fen: self.position_fen.clone(),
        }
    }
}

/// Mistake or blunder entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveHighlight {
    pub move_number: usize,
    pub player: Side,
    pub played: String,
    pub best: String,
    pub loss: u32,
    pub position_fen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMoveHighlight {
    pub move_number: usize,
    pub player: Side,
    #[serde(rename = "move")]
    pub played: String,
    pub position_fen: String,
}

/// Large eval swing across a single move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalMoment {
    pub move_number: usize,
    pub player: Side,
    pub eval_change: i32,
    pub position_fen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Engine metrics present
    Analyzed,
    /// Raw game data only
    Fetched,
}

/// Engine-derived metrics; absent for `fetched` results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMetrics {
    pub accuracy_white: f64,
    pub accuracy_black: f64,
    pub avg_cp_loss_white: f64,
    pub avg_cp_loss_black: f64,
    pub classifications_white: ClassificationCounts,
    pub classifications_black: ClassificationCounts,
    pub total_moves: usize,
    pub mistakes: Vec<MoveHighlight>,
    pub blunders: Vec<MoveHighlight>,
    pub best_moves: Vec<BestMoveHighlight>,
    pub critical_moments: Vec<CriticalMoment>,
    pub move_analyses: Vec<MoveRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnalysisResult {
    pub game_id: String,
    pub white: String,
    pub black: String,
    pub result: String,
    pub opening: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub status: AnalysisStatus,
    #[serde(flatten)]
    pub metrics: Option<GameMetrics>,
}

impl GameAnalysisResult {
    pub fn analyzed(game_id: &str, metadata: &GameMetadata, metrics: GameMetrics) -> Self {
        Self {
            game_id: game_id.to_string(),
            white: metadata.white.clone(),
            black: metadata.black.clone(),
            result: metadata.result.clone(),
            opening: metadata.opening_label(),
            date: metadata.date.clone(),
            time_control: metadata.time_control.clone(),
            platform: None,
            status: AnalysisStatus::Analyzed,
            metrics: Some(metrics),
        }
    }

    /// Result for a game whose engine analysis failed or never ran
    pub fn fetched(game_id: &str, metadata: &GameMetadata) -> Self {
        Self {
            game_id: game_id.to_string(),
            white: metadata.white.clone(),
            black: metadata.black.clone(),
            result: metadata.result.clone(),
            opening: metadata.opening_label(),
            date: metadata.date.clone(),
            time_control: metadata.time_control.clone(),
            platform: None,
            status: AnalysisStatus::Fetched,
            metrics: None,
        }
    }

    /// Tag the result with the platform the game was fetched from.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn is_analyzed(&self) -> bool {
        self.status == AnalysisStatus::Analyzed
    }

    pub fn accuracy(&self, side: Side) -> Option<f64> {
        self.metrics.as_ref().map(|m| match side {
            Side::White => m.accuracy_white,
            Side::Black => m.accuracy_black,
        })
    }
}

/// Input unit for the batch scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTask {
    pub game_id: String,
    /// PGN text of the game
    pub pgn: String,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    EngineUnavailable,
    EngineTimeout,
    Engine,
    Parse,
    Panicked,
}

/// Terminal per-game failure, tagged with the game it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub game_id: String,
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(game_id: &str, error: &WorkerError) -> Self {
        let kind = match error {
            WorkerError::EngineUnavailable(_) => TaskErrorKind::EngineUnavailable,
            WorkerError::EngineTimeout(_) => TaskErrorKind::EngineTimeout,
            WorkerError::Parse(_) => TaskErrorKind::Parse,
            _ => TaskErrorKind::Engine,
        };
        Self {
            game_id: game_id.to_string(),
            kind,
            message: error.to_string(),
        }
    }

    pub fn panicked(game_id: &str, message: String) -> Self {
        Self {
            game_id: game_id.to_string(),
            kind: TaskErrorKind::Panicked,
            message,
        }
    }

    /// Parse failures skip the game; everything else degrades it to `fetched`.
    pub fn degrades_to_fetched(&self) -> bool {
        self.kind != TaskErrorKind::Parse
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game {}: {}", self.game_id, self.message)
    }
}

impl std::error::Error for TaskError {}

pub type TaskOutcome = Result<GameAnalysisResult, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> GameMetadata {
        GameMetadata {
            white: "alice".into(),
            black: "bob".into(),
            result: "1-0".into(),
            eco: Some("C60".into()),
            date: Some("2024.03.09".into()),
            time_control: Some("180+2".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fetched_result_has_no_metrics() {
        let result = GameAnalysisResult::fetched("g1", &metadata());
        assert!(!result.is_analyzed());
        assert_eq!(result.accuracy(Side::White), None);
        assert_eq!(result.opening.as_deref(), Some("C60"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "fetched");
        assert!(json.get("accuracy_white").is_none());
        assert!(json.get("move_analyses").is_none());
        assert_eq!(json["date"], "2024.03.09");
        assert_eq!(json["time_control"], "180+2");
        assert!(json.get("platform").is_none());

        let tagged = result.with_platform(Platform::ChessCom);
        let json = serde_json::to_value(&tagged).unwrap();
        assert_eq!(json["platform"], "CHESS_COM");
        let back: GameAnalysisResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, tagged);
    }

    #[test]
    fn test_critical_moment_swing_saturates() {
        let record = MoveRecord {
            ply: 0,
            move_number: 1,
            move_san: "e4".into(),
            move_uci: "e2e4".into(),
            side: Side::White,
            eval_before: Score(i32::MIN),
            eval_after: Score(i32::MAX),
            best_move_san: "e4".into(),
            best_move_uci: "e2e4".into(),
            centipawn_loss: 0,
            classification: Classification::Best,
            position_fen: String::new(),
        };
        assert_eq!(record.critical_moment().eval_change, i32::MAX);
    }

    #[test]
    fn test_task_error_kinds() {
        let timeout = WorkerError::EngineTimeout(std::time::Duration::from_secs(1));
        let err = TaskError::new("g1", &timeout);
        assert_eq!(err.kind, TaskErrorKind::EngineTimeout);
        assert!(err.degrades_to_fetched());

        let parse = WorkerError::Parse(chess_core::ChessCoreError::EmptyMovetext);
        let err = TaskError::new("g2", &parse);
        assert_eq!(err.kind, TaskErrorKind::Parse);
        assert!(!err.degrades_to_fetched());
        assert_eq!(err.to_string(), "game g2: Parse error: PGN contains no moves");
    }
}
