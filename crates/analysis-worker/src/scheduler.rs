//! Bounded-concurrency batch scheduler
//!
//! Each game gets its own engine, spawned only once a slot is free, so at most
//! `max_concurrency` engines are alive at any time. Outcomes are delivered in
//! completion order over an mpsc channel.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{Id, JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::analyzer::GameAnalyzer;
use crate::evaluator::{EvaluatorFactory, PositionEvaluator};
use crate::types::{AnalysisTask, TaskError, TaskOutcome};

pub struct BatchScheduler<F> {
    factory: Arc<F>,
    max_concurrency: usize,
}

impl<F: EvaluatorFactory> BatchScheduler<F> {
    /// A `max_concurrency` of zero is treated as one.
    pub fn new(factory: F, max_concurrency: usize) -> Self {
        Self::with_shared(Arc::new(factory), max_concurrency)
    }

    pub fn with_shared(factory: Arc<F>, max_concurrency: usize) -> Self {
        Self {
            factory,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Start analyzing `tasks`. Must be called inside a tokio runtime.
    ///
    /// The stream ends once every task has produced a result or an error.
    /// Dropping it aborts the games still in flight; [`ResultStream::cancel`]
    /// does the same and waits until their engines are gone.
    pub fn run(&self, tasks: Vec<AnalysisTask>) -> ResultStream {
        info!(
            tasks = tasks.len(),
            workers = self.max_concurrency,
            "Dispatching batch"
        );

        // Room for every outcome, so finished games never wait on the consumer
        let (tx, rx) = mpsc::channel(tasks.len().max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&self.factory),
            tasks.into(),
            Arc::new(Semaphore::new(self.max_concurrency)),
            tx,
            cancel_rx,
        ));

        ResultStream {
            rx,
            cancel: cancel_tx,
            dispatcher,
        }
    }
}

/// Owns every game task of one batch. Stops early, aborting and reaping the
/// running games, when the stream is cancelled or dropped.
async fn dispatch<F: EvaluatorFactory>(
    factory: Arc<F>,
    mut queue: VecDeque<AnalysisTask>,
    slots: Arc<Semaphore>,
    tx: mpsc::Sender<TaskOutcome>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut running: JoinSet<TaskOutcome> = JoinSet::new();
    let mut games: HashMap<Id, String> = HashMap::new();

    while !queue.is_empty() || !running.is_empty() {
        tokio::select! {
            _ = &mut cancel => {
                if !running.is_empty() {
                    warn!(in_flight = running.len(), queued = queue.len(), "Batch cancelled");
                }
                running.shutdown().await;
                return;
            }
            permit = Arc::clone(&slots).acquire_owned(), if !queue.is_empty() => {
                let (Ok(permit), Some(task)) = (permit, queue.pop_front()) else {
                    break;
                };
                let game_id = task.game_id.clone();
                let factory = Arc::clone(&factory);
                let handle = running.spawn(async move {
                    let outcome = analyze_one(factory, task).await;
                    drop(permit);
                    outcome
                });
                games.insert(handle.id(), game_id);
            }
            Some(joined) = running.join_next_with_id() => {
                let outcome = match joined {
                    Ok((id, outcome)) => {
                        games.remove(&id);
                        outcome
                    }
                    Err(e) => {
                        // A panicking analyzer is reported against its game
                        let game_id = games.remove(&e.id()).unwrap_or_default();
                        error!(game_id = %game_id, error = %e, "Analysis task panicked");
                        Err(TaskError::panicked(&game_id, e.to_string()))
                    }
                };
                if tx.send(outcome).await.is_err() {
                    running.shutdown().await;
                    return;
                }
            }
        }
    }
}

async fn analyze_one<F: EvaluatorFactory>(factory: Arc<F>, task: AnalysisTask) -> TaskOutcome {
    let evaluator = factory
        .spawn()
        .await
        .map_err(|e| TaskError::new(&task.game_id, &e))?;

    let mut analyzer = GameAnalyzer::new(evaluator);
    let outcome = analyzer.analyze(&task).await;
    analyzer.into_evaluator().shutdown().await;

    outcome.map_err(|e| TaskError::new(&task.game_id, &e))
}

/// Completion-ordered outcomes of a batch
pub struct ResultStream {
    rx: mpsc::Receiver<TaskOutcome>,
    cancel: oneshot::Sender<()>,
    dispatcher: JoinHandle<()>,
}

impl ResultStream {
    pub async fn next(&mut self) -> Option<TaskOutcome> {
        self.rx.recv().await
    }

    /// Abort the games still running and wait until every one has released
    /// its engine. Queued games are never started.
    pub async fn cancel(self) {
        let ResultStream {
            rx,
            cancel,
            dispatcher,
        } = self;
        let _ = cancel.send(());
        drop(rx);
        if let Err(e) = dispatcher.await {
            error!(error = %e, "Batch dispatcher failed");
        }
    }
}

impl Stream for ResultStream {
    type Item = TaskOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
