//! Chess rules adapter: PGN parsing, SAN replay and move notation.
//!
//! Everything rules-related is delegated to `shakmaty`; this crate only turns
//! recorded games into the canonical positions and notations the analysis
//! pipeline consumes.

pub mod error;
pub mod game_data;
pub mod pgn;
pub mod replay;

pub use error::ChessCoreError;
pub use game_data::{GameData, GameMetadata};
pub use replay::{describe_uci, replay, side_to_move, MoveNotation, Ply, Side, STANDARD_START_FEN};
