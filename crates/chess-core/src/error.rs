use thiserror::Error;

/// Errors raised while turning a recorded game into positions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChessCoreError {
    #[error("PGN contains no moves")]
    EmptyMovetext,

    #[error("Non-standard starting position: {0}")]
    NonStandardStart(String),

    #[error("Invalid SAN '{san}' at ply {ply}")]
    InvalidSan { ply: usize, san: String },

    #[error("Illegal move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),
}
