//! # Worker Pipeline
//!
//! Bounded-concurrency dispatch of a lazy stream of work items.
//!
//! ## Overview
//!
//! One dispatcher pulls items from the stream. Before pulling it acquires a
//! permit from a semaphore sized to the worker count, so at most `workers`
//! items are in flight and the source is never read ahead. Each item runs
//! the handler in its own task inside a `JoinSet`.
//!
//! Cancellation stops dispatch at the next permit or item boundary. Tasks
//! already running are not aborted; the handler is expected to watch the
//! same token before its own network calls.
//!
//! [`WorkerPool::run`] returns only after every dispatched task has finished,
//! which is the barrier the flush phases rely on.

use core_async::select;
use core_async::sync::{CancellationToken, Semaphore};
use core_async::task::JoinSet;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// What happened during one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Items handed to a worker
    pub dispatched: u64,
    /// Workers that panicked; their item is lost
    pub panicked: usize,
    /// Dispatch stopped because the token was cancelled
    pub cancelled: bool,
}

/// Fixed-size pool of workers fed by a single dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool; a worker count of zero is raised to one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Feeds every item of `items` to `handler` and waits for all of them.
    pub async fn run<T, S, F, Fut>(
        &self,
        mut items: S,
        cancel: &CancellationToken,
        handler: F,
    ) -> PoolOutcome
    where
        T: Send + 'static,
        S: Stream<Item = T> + Unpin,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let handler = Arc::new(handler);
        let mut tasks = JoinSet::new();
        let mut outcome = PoolOutcome::default();

        loop {
            let permit = select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let item = select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                item = items.next() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            outcome.dispatched += 1;
            let handler = Arc::clone(&handler);
            tasks.spawn(async move {
                let _permit = permit;
                handler(item).await;
            });

            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    record_join_error(&mut outcome, e);
                }
            }
        }

        debug!(
            "Dispatch finished after {} items, waiting for {} workers",
            outcome.dispatched,
            tasks.len()
        );

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                record_join_error(&mut outcome, e);
            }
        }

        outcome
    }
}

fn record_join_error(outcome: &mut PoolOutcome, e: core_async::task::JoinError) {
    if e.is_panic() {
        error!("Worker panicked: {}", e);
        outcome.panicked += 1;
    }
}
