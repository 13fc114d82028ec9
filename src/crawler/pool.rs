//! Bounded worker pool
//!
//! A pool drains one queue until nothing is pending and nothing is in
//! flight. Tasks may feed the queue they are draining, so exhaustion is the
//! only termination condition. Every task outcome is settled here: completed
//! entries are marked handled, retryable failures go back to the queue while
//! the retry budget lasts, and everything else fails terminally.

use crate::crawler::{Phase, PhaseReport, TaskFailure, TaskSuccess};
use crate::frontier::Frontier;
use crate::storage::{QueueEntry, QueueKind, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinError, JoinSet};

/// Progress is logged every this many completed tasks
const PROGRESS_INTERVAL: usize = 10;

/// The per-phase behavior plugged into the pool
#[async_trait]
pub trait PhaseWorker: Send + Sync + 'static {
    fn phase(&self) -> Phase;

    fn queue(&self) -> QueueKind;

    /// Decides whether a claimed entry is processed at all
    ///
    /// Refused entries are marked skipped without being fetched.
    fn admit(&self, _entry: &QueueEntry) -> bool {
        true
    }

    /// Processes one attempt of an entry
    async fn process(&self, entry: &QueueEntry) -> Result<TaskSuccess, TaskFailure>;

    /// Called after a failed attempt was returned to the queue
    fn on_retry(&self, _entry: &QueueEntry) {}

    /// Called once when an entry fails terminally
    ///
    /// Returns the number of records emitted for it.
    fn on_terminal_failure(&self, _entry: &QueueEntry, _failure: &TaskFailure) -> usize {
        0
    }
}

/// Pool limits for one phase
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Tasks running at once
    pub concurrency: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wall-clock budget of a single attempt
    pub task_timeout: Duration,
}

/// Drains the worker's queue to exhaustion
///
/// Page-level failures never end the phase; only storage failures do.
pub async fn run_phase<W: PhaseWorker>(
    worker: Arc<W>,
    frontier: Arc<Frontier>,
    settings: PoolSettings,
) -> StorageResult<PhaseReport> {
    let phase = worker.phase();
    let queue = worker.queue();
    let concurrency = settings.concurrency.max(1);
    let started = Instant::now();

    let mut report = PhaseReport::new(phase);
    let mut tasks: JoinSet<Result<TaskSuccess, TaskFailure>> = JoinSet::new();
    let mut in_flight: HashMap<Id, QueueEntry> = HashMap::new();

    tracing::info!(
        "Starting {} phase with {} concurrent tasks",
        phase,
        concurrency
    );

    loop {
        while tasks.len() < concurrency {
            let Some(entry) = frontier.dequeue(queue)? else {
                break;
            };

            if !worker.admit(&entry) {
                frontier.skip(&entry)?;
                report.skipped += 1;
                tracing::debug!("Skipped {} without fetching", entry.url);
                continue;
            }

            tracing::debug!("Processing {} ({} queue)", entry.url, queue);
            let task_worker = Arc::clone(&worker);
            let task_entry = entry.clone();
            let budget = settings.task_timeout;
            let handle = tasks.spawn(async move {
                match tokio::time::timeout(budget, task_worker.process(&task_entry)).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskFailure::retryable(format!(
                        "Task exceeded its {:?} budget",
                        budget
                    ))),
                }
            });
            in_flight.insert(handle.id(), entry);
        }

        // An empty set here means nothing is pending and nothing is in flight
        let Some(joined) = tasks.join_next_with_id().await else {
            break;
        };

        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(aborted_task_failure(&e))),
        };

        match in_flight.remove(&id) {
            Some(entry) => {
                settle(worker.as_ref(), &frontier, &settings, &mut report, entry, result)?;
            }
            None => {
                tracing::error!("A {} task finished without a known queue entry", phase);
                report.failed += 1;
            }
        }

        let done = report.processed + report.failed;
        if done > 0 && done % PROGRESS_INTERVAL == 0 {
            let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
            let stats = frontier.stats(queue)?;
            tracing::info!(
                "Progress: {} {} pages done, {} pending, {:.2} pages/sec",
                done,
                phase,
                stats.pending,
                done as f64 / elapsed
            );
        }
    }

    tracing::info!(
        "{} phase drained in {:?}: {} processed, {} failed, {} skipped, {} retried, {} enqueued",
        phase,
        started.elapsed(),
        report.processed,
        report.failed,
        report.skipped,
        report.retried,
        report.enqueued
    );

    Ok(report)
}

/// A task that panicked or was cancelled is a retryable failure of its entry
fn aborted_task_failure(error: &JoinError) -> TaskFailure {
    if error.is_panic() {
        TaskFailure::retryable(format!("Task panicked: {}", error))
    } else {
        TaskFailure::retryable(format!("Task was cancelled: {}", error))
    }
}

/// Applies one task outcome to the queue and the report
fn settle<W: PhaseWorker>(
    worker: &W,
    frontier: &Frontier,
    settings: &PoolSettings,
    report: &mut PhaseReport,
    entry: QueueEntry,
    result: Result<TaskSuccess, TaskFailure>,
) -> StorageResult<()> {
    match result {
        Ok(success) => {
            frontier.complete(&entry)?;
            report.processed += 1;
            report.enqueued += success.enqueued;
            report.emitted += success.emitted;
        }
        Err(failure) if failure.retryable && entry.retry_count < settings.max_retries => {
            let retries = frontier.retry(&entry, &failure.message)?;
            worker.on_retry(&entry);
            report.retried += 1;
            tracing::warn!(
                "{} failed (retry {}/{}): {}",
                entry.url,
                retries,
                settings.max_retries,
                failure
            );
        }
        Err(failure) => {
            frontier.fail(&entry, &failure.message)?;
            report.failed += 1;
            tracing::error!(
                "{} failed terminally after {} retries: {}",
                entry.url,
                entry.retry_count,
                failure
            );
            report.emitted += worker.on_terminal_failure(&entry, &failure);
        }
    }

    Ok(())
}
