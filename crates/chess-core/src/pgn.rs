//! PGN parsing utilities: a lightweight regex-based parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ChessCoreError;
use crate::game_data::{GameData, GameMetadata};
use crate::replay::STANDARD_START_FEN;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid header regex"));
static TAG_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid tag regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("valid comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid variation regex"));
static NAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\d+").expect("valid NAG regex"));
static RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(?:1-0|0-1|1/2-1/2|\*)(?:\s|$)").expect("valid result regex"));
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=?[QRBN])?[+#]?|[O0]-[O0]-[O0][+#]?|[O0]-[O0][+#]?",
    )
    .expect("valid move regex")
});

/// Read the tag pairs of a single game. Missing players default to `Unknown`.
pub fn parse_metadata(pgn: &str) -> GameMetadata {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..Default::default()
    };
    let mut site = None;

    for cap in HEADER_RE.captures_iter(pgn) {
        let key = &cap[1];
        let value = cap[2].to_string();
        match key {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" | "UTCDate" if metadata.date.is_none() => metadata.date = Some(value),
            "TimeControl" => metadata.time_control = Some(value),
            "ECO" => metadata.eco = Some(value),
            "Opening" => metadata.opening = Some(value),
            "Event" => metadata.event = Some(value),
            "Link" => metadata.link = Some(value),
            "Site" => site = Some(value),
            _ => {}
        }
    }

    if metadata.link.is_none() {
        metadata.link = site.filter(|s| s.starts_with("http"));
    }
    metadata
}

/// Parse a single-game PGN string into a GameData struct.
pub fn parse_pgn(pgn: &str) -> Result<GameData, ChessCoreError> {
    let metadata = parse_metadata(pgn);

    // Filter non-standard positions
    if extract_header(pgn, "SetUp").as_deref() == Some("1") {
        if let Some(f) = extract_header(pgn, "FEN") {
            if f.trim() != STANDARD_START_FEN {
                return Err(ChessCoreError::NonStandardStart(f));
            }
        }
    }

    // A game ended before the first move is still a game if it is tagged or terminated
    let moves = extract_moves(pgn);
    if moves.is_empty() && !HEADER_RE.is_match(pgn) && !has_result_token(pgn) {
        return Err(ChessCoreError::EmptyMovetext);
    }

    Ok(GameData {
        metadata,
        moves,
        pgn: pgn.to_string(),
    })
}

fn has_result_token(pgn: &str) -> bool {
    let no_headers = TAG_PAIR_RE.replace_all(pgn, "");
    let movetext = COMMENT_RE.replace_all(&no_headers, " ");
    RESULT_RE.is_match(&movetext)
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = TAG_PAIR_RE.replace_all(pgn, "");
    let no_comments = COMMENT_RE.replace_all(&no_headers, " ");

    // Innermost variations first until nothing nested remains
    let mut movetext = no_comments.into_owned();
    while VARIATION_RE.is_match(&movetext) {
        movetext = VARIATION_RE.replace_all(&movetext, " ").into_owned();
    }
    let movetext = NAG_RE.replace_all(&movetext, " ");

    MOVE_RE
        .find_iter(&movetext)
        .map(|m| m.as_str().replace('0', "O"))
        .collect()
}

/// Split a multi-game PGN file into one chunk per game.
///
/// A new game starts at the first tag pair that follows movetext.
pub fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut seen_movetext = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if seen_movetext {
                games.push(std::mem::take(&mut current));
                seen_movetext = false;
            }
        } else if !trimmed.is_empty() {
            seen_movetext = true;
        }
        current.push_str(line);
        current.push('\n');
    }

    if seen_movetext {
        games.push(current);
    }

    games
}

/// Extract a string value from a PGN header (e.g. WhiteElo, Site).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}
