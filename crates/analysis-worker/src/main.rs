//! Analysis Worker
//!
//! Service mode polls the `"Job"` table and analyzes each queued job's games
//! with local Stockfish processes. `--pgn <file>` analyzes a PGN file locally.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use analysis_worker::config::WorkerConfig;
use analysis_worker::db::{self, PgResultSink};
use analysis_worker::job::{run_job, JobPayload, JobRef, JobStatus, Platform};
use analysis_worker::sink::{MemorySink, ResultSink};
use analysis_worker::source::{FetchedGame, GameSource, PgnDirectorySource};
use analysis_worker::stockfish::StockfishFactory;

/// Local run options: --pgn <file> [--depth N] [--workers W]
struct LocalArgs {
    pgn: PathBuf,
    depth: Option<u32>,
    workers: Option<usize>,
}

fn parse_local_args() -> Option<LocalArgs> {
    let args: Vec<String> = std::env::args().collect();
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
    };

    let pgn = value_of("--pgn")?;
    Some(LocalArgs {
        pgn: PathBuf::from(pgn),
        depth: value_of("--depth").and_then(|v| v.parse().ok()),
        workers: value_of("--workers").and_then(|v| v.parse().ok()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let mut config = WorkerConfig::load()?;
    info!(
        stockfish_path = %config.stockfish_path,
        depth = config.analysis_depth,
        max_workers = config.max_workers,
        "Worker config loaded"
    );

    if let Some(local) = parse_local_args() {
        if let Some(workers) = local.workers {
            config.max_workers = workers.max(1);
        }
        return run_local(&config, local).await;
    }

    run_service(&config).await
}

/// Analyze every game in one PGN file and print the job summary.
async fn run_local(config: &WorkerConfig, args: LocalArgs) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&args.pgn)
        .await
        .with_context(|| format!("reading {}", args.pgn.display()))?;

    let games: Vec<FetchedGame> = chess_core::pgn::split_games(&text)
        .iter()
        .map(|pgn| FetchedGame::from_pgn(Platform::Lichess, pgn))
        .collect();

    let job = JobRef {
        id: "local".to_string(),
        user_id: "local".to_string(),
        payload: JobPayload {
            username: args.pgn.display().to_string(),
            game_limit: games.len(),
            analysis_depth: args.depth.unwrap_or(config.analysis_depth),
            ..JobPayload::default()
        },
    };

    let factory = Arc::new(StockfishFactory::from_config(config));
    let sink = MemorySink::new();
    let summary = run_job(&job, &games, factory, &sink, config).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Poll the job table until told to stop or the queue stays empty too long.
async fn run_service(config: &WorkerConfig) -> anyhow::Result<()> {
    let database_url = config.require_database_url()?;
    let pool_size = (config.max_workers + 2) as u32; // headroom for overlapping saves
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .idle_timeout(std::time::Duration::from_secs(300))
        .connect(database_url)
        .await?;
    info!(pool_size, "Database connection pool established");

    let factory = Arc::new(StockfishFactory::from_config(config));
    let source = PgnDirectorySource::new(&config.games_dir);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        let _ = stop_tx.send(true);
    });

    let mut empty_polls = 0u32;
    info!("Starting main loop");

    while !*stop_rx.borrow() {
        let queued = match db::fetch_queued_job(&pool).await {
            Ok(queued) => queued,
            Err(e) => {
                error!(error = %e, "Failed to poll jobs");
                None
            }
        };

        let Some(queued) = queued else {
            empty_polls += 1;
            if config.max_empty_polls.is_some_and(|max| empty_polls >= max) {
                info!(empty_polls, "Queue empty, exiting");
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = stop_rx.changed() => {}
            }
            continue;
        };
        empty_polls = 0;

        match db::claim_job(&pool, &queued.id).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                error!(job_id = %queued.id, error = %e, "Failed to claim job");
                tokio::time::sleep(config.poll_interval).await;
                continue;
            }
        }
        let job_id = queued.id.clone();
        let user_id = queued.user_id.clone();

        let job = match queued.into_job() {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Invalid job payload");
                let placeholder = JobRef {
                    id: job_id.clone(),
                    user_id,
                    payload: JobPayload::default(),
                };
                let payload = serde_json::json!({ "error": e.to_string() });
                if let Err(e) = PgResultSink::new(pool.clone(), &placeholder)
                    .mark_job_status(&job_id, JobStatus::Failed, Some(&payload))
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Could not record job failure");
                }
                continue;
            }
        };

        // A running job always finishes; shutdown is only checked between jobs
        let games = match source
            .fetch(job.payload.platform, &job.payload.username, job.payload.game_limit)
            .await
        {
            Ok(games) => games,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to load games");
                Vec::new()
            }
        };
        let sink = PgResultSink::new(pool.clone(), &job).with_games(&games);

        if let Err(e) = run_job(&job, &games, Arc::clone(&factory), &sink, config).await {
            error!(job_id = %job.id, error = %e, "Job did not complete");
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, finishing current job"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, finishing current job"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, finishing current job");
    }
}
