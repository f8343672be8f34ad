//! Bounded-concurrency task runner with whole-batch retry.
//!
//! Every task runs at most `retries + 1` times. After each pass the failed
//! tasks are collected and re-run together; there is no backoff and no
//! per-task budget. Tasks must therefore be idempotent.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::{SyncAggregateError, SyncFileError};

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_RETRIES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of tasks in flight at once.
    pub workers: usize,
    /// How many times the set of failed tasks is re-run.
    pub retries: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Run `run` over every task with at most `options.workers` in flight.
///
/// Returns every failure of the final pass when some tasks still fail after
/// the retry budget is spent.
pub async fn run_pool<T, F, Fut>(
    tasks: Vec<T>,
    options: PoolOptions,
    run: F,
) -> Result<(), SyncAggregateError>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), SyncFileError>>,
{
    let workers = options.workers.max(1);
    let mut pending = tasks;
    let mut attempt = 0usize;

    loop {
        if pending.is_empty() {
            return Ok(());
        }
        info!(tasks = pending.len(), attempt, workers, "[POOL] Running tasks");

        let outcomes: Vec<(T, Result<(), SyncFileError>)> = stream::iter(pending)
            .map(|task| {
                let fut = run(task.clone());
                async move { (task, fut.await) }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let (failed_tasks, errors): (Vec<T>, Vec<SyncFileError>) = outcomes
            .into_iter()
            .filter_map(|(task, outcome)| outcome.err().map(|e| (task, e)))
            .unzip();

        if errors.is_empty() {
            return Ok(());
        }

        if attempt >= options.retries {
            warn!(failed = errors.len(), "[POOL] Retry budget exhausted");
            return Err(SyncAggregateError { errors });
        }

        for err in &errors {
            warn!(path = %err.path, error = %err.source, "[POOL] Task failed, will retry");
        }
        attempt += 1;
        pending = failed_tasks;
    }
}
