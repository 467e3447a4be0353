//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::debug;

use chess_core::side_to_move;
use chess_core::Side;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::evaluator::{Evaluation, EvaluatorFactory, PositionEvaluator, Score};

/// Raw values from the last scored `info` line of a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SearchReport {
    cp: Option<i32>,
    mate: Option<i32>,
    pv: Vec<String>,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    query_timeout: Duration,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(
        path: &str,
        threads: u32,
        hash_mb: u32,
        query_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::EngineUnavailable(format!("Failed to spawn {path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("Stockfish stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| WorkerError::EngineUnavailable("Stockfish stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
            query_timeout,
        };

        let handshake = async {
            engine.send("uci").await?;
            engine.wait_for("uciok").await?;

            // Configure for analysis
            engine
                .send(&format!("setoption name Threads value {threads}"))
                .await?;
            engine
                .send(&format!("setoption name Hash value {hash_mb}"))
                .await?;
            engine.send("setoption name UCI_AnalyseMode value true").await?;
            engine.send("isready").await?;
            engine.wait_for("readyok").await
        };

        let outcome = timeout(query_timeout, handshake).await;
        match outcome {
            Ok(Ok(())) => Ok(engine),
            Ok(Err(e)) => Err(WorkerError::EngineUnavailable(e.to_string())),
            Err(_) => Err(WorkerError::EngineUnavailable(format!(
                "UCI handshake exceeded {query_timeout:?}"
            ))),
        }
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; EOF means the process went away.
    async fn read_line(&mut self, line: &mut String) -> Result<(), WorkerError> {
        line.clear();
        let read = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(WorkerError::Engine("Stockfish closed its output".into()));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Run a fixed-depth search and collect the final report
    async fn search(
        &mut self,
        fen: &str,
        depth: u32,
    ) -> Result<(SearchReport, Option<String>), WorkerError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut report = SearchReport::default();
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            // A mated or stalemated root reports `score` with no pv
            if trimmed.starts_with("info ") && !trimmed.starts_with("info string") {
                let info = parse_info(trimmed);
                if info.cp.is_some() || info.mate.is_some() {
                    report = info;
                }
            } else if trimmed.starts_with("bestmove") {
                debug!(line = trimmed, "SF >");
                return Ok((report, parse_bestmove(trimmed)));
            }
        }
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(mut self) {
        let _ = self.send("quit").await;
        if timeout(Duration::from_secs(2), self.process.wait()).await.is_err() {
            let _ = self.process.start_kill();
        }
    }
}

impl PositionEvaluator for StockfishEngine {
    async fn evaluate(&mut self, fen: &str, depth: u32) -> Result<Evaluation, WorkerError> {
        let white_to_move = side_to_move(fen)? == Side::White;
        let budget = self.query_timeout;

        let (report, bestmove) = timeout(budget, self.search(fen, depth))
            .await
            .map_err(|_| WorkerError::EngineTimeout(budget))??;

        let best_move = bestmove.or_else(|| report.pv.first().cloned());
        Ok(Evaluation {
            score: Score::from_engine(report.cp, report.mate, white_to_move),
            best_move,
        })
    }

    async fn shutdown(self) {
        self.quit().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Spawns one Stockfish process per game
#[derive(Debug, Clone)]
pub struct StockfishFactory {
    pub path: String,
    pub threads: u32,
    pub hash_mb: u32,
    pub query_timeout: Duration,
}

impl StockfishFactory {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            path: config.stockfish_path.clone(),
            threads: config.engine_threads,
            hash_mb: config.engine_hash_mb,
            query_timeout: config.query_timeout,
        }
    }
}

impl EvaluatorFactory for StockfishFactory {
    type Evaluator = StockfishEngine;

    async fn spawn(&self) -> Result<StockfishEngine, WorkerError> {
        StockfishEngine::new(&self.path, self.threads, self.hash_mb, self.query_timeout).await
    }
}

/// Parse score and PV from an info line
fn parse_info(line: &str) -> SearchReport {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut report = SearchReport::default();

    let mut i = 0;
    while i < parts.len() {
        match parts[i] {
            "cp" if i + 1 < parts.len() => {
                report.cp = parts[i + 1].parse().ok();
                i += 1;
            }
            "mate" if i + 1 < parts.len() => {
                report.mate = parts[i + 1].parse().ok();
                i += 1;
            }
            "pv" => {
                // PV runs to end of line or next keyword
                report.pv = parts[i + 1..]
                    .iter()
                    .take_while(|p| !p.starts_with("bmc") && **p != "string")
                    .map(|p| p.to_string())
                    .collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    report
}

/// Parse the move from a `bestmove` line
fn parse_bestmove(line: &str) -> Option<String> {
    line.split_whitespace()
        .nth(1)
        .filter(|m| *m != "(none)" && *m != "0000")
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        let info = parse_info(line);
        assert_eq!(info.cp, Some(35));
        assert_eq!(info.mate, None);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        let info = parse_info(line);
        assert_eq!(info.mate, Some(-3));
        assert_eq!(info.cp, None);
    }

    #[test]
    fn test_parse_score_without_pv() {
        let info = parse_info("info depth 0 score mate 0");
        assert_eq!(info.mate, Some(0));
        assert_eq!(info.cp, None);
        assert!(info.pv.is_empty());

        let info = parse_info("info depth 0 score cp 0");
        assert_eq!(info.cp, Some(0));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        assert_eq!(parse_info(line).pv, vec!["e2e4", "e7e5", "g1f3"]);
        let line = "info depth 20 score cp 35 pv e2e4 bmc 0.1";
        assert_eq!(parse_info(line).pv, vec!["e2e4"]);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(parse_bestmove("bestmove e2e4 ponder e7e5").as_deref(), Some("e2e4"));
        assert_eq!(parse_bestmove("bestmove (none)"), None);
        assert_eq!(parse_bestmove("bestmove"), None);
    }

    /// Minimal UCI responder: every search reports the root as mated.
    #[cfg(unix)]
    const MATED_ENGINE: &str = r#"#!/bin/sh
while read -r cmd; do
  case "$cmd" in
    uci) echo "id name mated-stub"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "info depth 0 score mate 0"; echo "bestmove (none)" ;;
    quit) exit 0 ;;
  esac
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mated_position_scores_as_lost() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("mated-engine-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("engine.sh");
        std::fs::write(&script, MATED_ENGINE).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let factory = StockfishFactory {
            path: script.display().to_string(),
            threads: 1,
            hash_mb: 16,
            query_timeout: Duration::from_secs(5),
        };
        let mut engine = factory.spawn().await.unwrap();

        // After 1. f3 e5 2. g4 Qh4#: white to move and mated
        let white_mated = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
        let eval = engine.evaluate(white_mated, 10).await.unwrap();
        assert_eq!(eval.score, Score(-10_000));
        assert_eq!(eval.best_move, None);

        // Same report with black to move is a win for white
        let black_mated = "rnbqkbnr/ppppp2p/5p2/6pQ/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 3";
        let eval = engine.evaluate(black_mated, 10).await.unwrap();
        assert_eq!(eval.score, Score(10_000));

        engine.shutdown().await;
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let factory = StockfishFactory {
            path: "/nonexistent/stockfish-binary".into(),
            threads: 1,
            hash_mb: 16,
            query_timeout: Duration::from_secs(1),
        };
        let err = factory.probe().await.unwrap_err();
        assert!(matches!(err, WorkerError::EngineUnavailable(_)));
    }
}
