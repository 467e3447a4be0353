//! Move analysis and classification. Pure functions only.
//! (No Board/Engine/Database dependencies)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluator::Score;

/// Classification thresholds (centipawn loss, inclusive upper bounds)
const THRESHOLD_BEST: u32 = 10;
const THRESHOLD_EXCELLENT: u32 = 30;
const THRESHOLD_GOOD: u32 = 100;
const THRESHOLD_INACCURACY: u32 = 200;
const THRESHOLD_MISTAKE: u32 = 500;

/// Eval swing that marks a critical moment
pub const CRITICAL_SWING: i64 = 150;

/// Mean loss at which accuracy saturates to zero
const ACCURACY_ZERO_LOSS: f64 = 200.0;

/// Maximum entries kept in each highlight list
pub const HIGHLIGHT_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Best => "best",
            Classification::Excellent => "excellent",
            Classification::Good => "good",
            Classification::Inaccuracy => "inaccuracy",
            Classification::Mistake => "mistake",
            Classification::Blunder => "blunder",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub best: u32,
    pub excellent: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
}

impl ClassificationCounts {
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Best => self.best += 1,
            Classification::Excellent => self.excellent += 1,
            Classification::Good => self.good += 1,
            Classification::Inaccuracy => self.inaccuracy += 1,
            Classification::Mistake => self.mistake += 1,
            Classification::Blunder => self.blunder += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.best + self.excellent + self.good + self.inaccuracy + self.mistake + self.blunder
    }
}

/// Centipawn loss for the mover. Both scores are from white's perspective.
pub fn calculate_cp_loss(eval_before: Score, eval_after: Score, mover_is_white: bool) -> u32 {
    let before = i64::from(eval_before.0);
    let after = i64::from(eval_after.0);
    let loss = if mover_is_white {
        before - after
    } else {
        after - before
    };
    u32::try_from(loss.max(0)).unwrap_or(u32::MAX)
}

pub fn classify_move(cp_loss: u32) -> Classification {
    if cp_loss <= THRESHOLD_BEST {
        Classification::Best
    } else if cp_loss <= THRESHOLD_EXCELLENT {
        Classification::Excellent
    } else if cp_loss <= THRESHOLD_GOOD {
        Classification::Good
    } else if cp_loss <= THRESHOLD_INACCURACY {
        Classification::Inaccuracy
    } else if cp_loss <= THRESHOLD_MISTAKE {
        Classification::Mistake
    } else {
        Classification::Blunder
    }
}

/// Whether the eval swing across a move marks a critical moment.
pub fn is_critical(eval_before: Score, eval_after: Score) -> bool {
    (i64::from(eval_after.0) - i64::from(eval_before.0)).abs() > CRITICAL_SWING
}

/// Linear accuracy model: `100 * (1 - mean_loss / 200)`, clamped, one decimal.
pub fn calculate_accuracy(losses: &[u32]) -> f64 {
    if losses.is_empty() {
        return 100.0;
    }
    let mean = losses.iter().map(|&l| f64::from(l)).sum::<f64>() / losses.len() as f64;
    let accuracy = 100.0 * (1.0 - mean / ACCURACY_ZERO_LOSS);
    round_one_decimal(accuracy).clamp(0.0, 100.0)
}

/// Average centipawn loss, one decimal. Zero for no moves.
pub fn average_cp_loss(losses: &[u32]) -> f64 {
    if losses.is_empty() {
        return 0.0;
    }
    let mean = losses.iter().map(|&l| f64::from(l)).sum::<f64>() / losses.len() as f64;
    round_one_decimal(mean)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Append-only list that keeps the first `HIGHLIGHT_CAP` entries in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct CappedList<T> {
    items: Vec<T>,
}

impl<T> Default for CappedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> CappedList<T> {
    /// Returns false when the list is already full and the item was dropped.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= HIGHLIGHT_CAP {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}
