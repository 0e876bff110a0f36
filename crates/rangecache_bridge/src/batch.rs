//! Bounded-concurrency execution of independent tasks.

use crate::error::{BridgeResult, TaskError};
use crate::sync::{payload_message, SyncBridge};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default batch size for operations touching local file descriptors.
///
/// Bounded well below typical OS open-file limits, since every task in a
/// batch may hold a descriptor at once.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Default batch size for pure network operations, which hold no local
/// descriptors and can run much wider.
pub const NOFILES_BATCH_SIZE: usize = 1280;

/// Concurrency bound for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    /// Consecutive batches of this many tasks; the next batch starts only
    /// once every member of the current one has settled.
    Bounded(usize),
    /// All tasks at once.
    Unbounded,
}

impl BatchSize {
    /// Bound for tasks that open local files.
    #[must_use]
    pub fn for_local_files() -> Self {
        Self::Bounded(DEFAULT_BATCH_SIZE)
    }

    /// Bound for tasks doing network I/O only.
    #[must_use]
    pub fn for_network() -> Self {
        Self::Bounded(NOFILES_BATCH_SIZE)
    }

    fn limit(self, total: usize) -> usize {
        match self {
            Self::Bounded(n) => n.max(1),
            Self::Unbounded => total.max(1),
        }
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self::for_local_files()
    }
}

/// Options for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Concurrency bound.
    pub batch_size: BatchSize,
    /// Per-task deadline. A task over deadline settles as
    /// [`TaskError::Timeout`]; its effects are not reverted.
    pub timeout: Option<Duration>,
    /// Stop after the first failing batch instead of running everything.
    ///
    /// The failing task's batch-mates still settle; tasks in batches not
    /// yet started settle as [`TaskError::Cancelled`].
    pub stop_on_error: bool,
}

/// Receives one notification per settled task.
///
/// This is how a bulk copy of many files reports aggregate progress: the
/// sink is advanced on success, failure, and timeout alike, but not for
/// tasks cancelled before they started.
pub trait ProgressSink: Send {
    /// Records `n` more settled units of work.
    fn advance(&mut self, n: u64);
}

/// Sink that ignores progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&mut self, _n: u64) {}
}

/// Adapts a closure into a [`ProgressSink`].
pub struct ProgressFn<F>(
    /// The closure receiving each increment.
    pub F,
);

impl<F: FnMut(u64) + Send> ProgressSink for ProgressFn<F> {
    fn advance(&mut self, n: u64) {
        (self.0)(n);
    }
}

/// Runs independent fallible tasks with bounded concurrency.
///
/// Tasks are split into consecutive batches of `options.batch_size`;
/// within a batch everything runs concurrently, and the whole batch
/// settles before the next one starts. There is no ordering guarantee
/// inside a batch, strict ordering across batches.
///
/// The output is index-aligned with the input: `results[i]` is task
/// `i`'s value or its captured error. A failing task does not cancel its
/// batch-mates unless `options.stop_on_error` is set, and even then
/// in-flight batch-mates settle first.
pub async fn run_chunked<Fut, T, E, P>(
    tasks: Vec<Fut>,
    options: BatchOptions,
    mut progress: P,
) -> Vec<Result<T, TaskError<E>>>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    P: ProgressSink,
{
    let total = tasks.len();
    let limit = options.batch_size.limit(total);
    let mut results: Vec<Result<T, TaskError<E>>> = Vec::with_capacity(total);
    let mut tasks = tasks.into_iter();
    let mut failed = false;

    while results.len() < total {
        if failed && options.stop_on_error {
            results.extend(tasks.by_ref().map(|_| Err(TaskError::Cancelled)));
            break;
        }

        let batch: Vec<Fut> = tasks.by_ref().take(limit).collect();
        debug!(batch_len = batch.len(), done = results.len(), total, "starting batch");
        let handles: Vec<_> = batch
            .into_iter()
            .map(|task| match options.timeout {
                Some(timeout) => tokio::spawn(async move {
                    match tokio::time::timeout(timeout, task).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(TimedOut::No(err)),
                        Err(_) => Err(TimedOut::Yes),
                    }
                }),
                None => tokio::spawn(async move { task.await.map_err(TimedOut::No) }),
            })
            .collect();

        // Awaiting in order still lets the whole batch run concurrently;
        // it only fixes the order progress is observed in.
        for handle in handles {
            let settled = match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(TimedOut::No(err))) => Err(TaskError::Failed(err)),
                Ok(Err(TimedOut::Yes)) => Err(TaskError::Timeout),
                Err(join_err) if join_err.is_panic() => Err(TaskError::Panicked {
                    message: payload_message(join_err.into_panic()),
                }),
                Err(_) => Err(TaskError::Cancelled),
            };
            failed |= settled.is_err();
            progress.advance(1);
            results.push(settled);
        }
    }
    results
}

// Distinguishes a task's own error from the timeout wrapper's.
enum TimedOut<E> {
    No(E),
    Yes,
}

/// Blocking wrapper: runs [`run_chunked`] on the bridge's loop thread.
///
/// # Errors
///
/// Returns a bridge error if the run could not be executed; per-task
/// failures are captured in the returned vector, not raised.
pub fn run_chunked_sync<Fut, T, E, P>(
    bridge: &SyncBridge,
    tasks: Vec<Fut>,
    options: BatchOptions,
    progress: P,
) -> BridgeResult<Vec<Result<T, TaskError<E>>>>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    P: ProgressSink + 'static,
{
    bridge.run_sync(run_chunked(tasks, options, progress), None)
}
