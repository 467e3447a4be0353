//! Replay SAN move lists into canonical positions.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::error::ChessCoreError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// The side that moves (or is to move).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// One half-move of a replayed game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
    /// Zero-based ply index
    pub index: usize,
    pub mover: Side,
    pub fen_before: String,
    pub san: String,
    pub uci: String,
    pub fen_after: String,
}

/// A move rendered in both notations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveNotation {
    pub san: String,
    pub uci: String,
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Replay SAN moves from the standard starting position.
pub fn replay(moves: &[String]) -> Result<Vec<Ply>, ChessCoreError> {
    let mut pos = Chess::default();
    let mut plies = Vec::with_capacity(moves.len());

    for (index, san_str) in moves.iter().enumerate() {
        let san_str = san_str.trim();
        let san_plus: SanPlus = san_str.parse().map_err(|_| ChessCoreError::InvalidSan {
            ply: index,
            san: san_str.to_string(),
        })?;
        let mv = san_plus
            .san
            .to_move(&pos)
            .map_err(|_| ChessCoreError::IllegalMove {
                ply: index,
                san: san_str.to_string(),
            })?;

        let fen_before = fen_of(&pos);
        let mover = Side::from(pos.turn());
        let uci = mv.to_uci(CastlingMode::Standard).to_string();

        pos.play_unchecked(mv);

        plies.push(Ply {
            index,
            mover,
            fen_before,
            san: san_str.to_string(),
            uci,
            fen_after: fen_of(&pos),
        });
    }

    Ok(plies)
}

/// Render an engine (UCI) move in SAN and UCI relative to `fen`.
pub fn describe_uci(fen: &str, uci: &str) -> Option<MoveNotation> {
    let setup: Fen = fen.parse().ok()?;
    let pos: Chess = setup.into_position(CastlingMode::Standard).ok()?;
    let uci_move: UciMove = uci.parse().ok()?;
    let mv = uci_move.to_move(&pos).ok()?;
    let san = San::from_move(&pos, mv);

    let mut after = pos.clone();
    after.play_unchecked(mv);
    let suffix = if after.is_checkmate() {
        "#"
    } else if after.is_check() {
        "+"
    } else {
        ""
    };

    Some(MoveNotation {
        san: format!("{san}{suffix}"),
        uci: mv.to_uci(CastlingMode::Standard).to_string(),
    })
}

/// Side to move in a FEN string.
pub fn side_to_move(fen: &str) -> Result<Side, ChessCoreError> {
    match fen.split_whitespace().nth(1) {
        Some("w") => Ok(Side::White),
        Some("b") => Ok(Side::Black),
        _ => Err(ChessCoreError::InvalidFen(fen.to_string())),
    }
}
