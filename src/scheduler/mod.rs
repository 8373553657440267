//! Download scheduler
//!
//! One [`Scheduler::run`] is one pass over the store:
//!
//! 1. Items left `Active` by an interrupted run are swept back to `Queued`
//!    and their partial files removed.
//! 2. Every `New`, `Queued` or `Failed` item the retry policy allows is
//!    snapshotted and moved to `Queued`.
//! 3. `min(snapshot, max_parallelism)` workers drain the snapshot from a
//!    shared queue. Each worker takes an item `Active`, fetches it, and
//!    moves it to `Completed` or `Failed`.
//!
//! Per-item fetch failures never stop the pass. A store error does: the
//! remaining workers finish their current item and exit, and the error is
//! returned. Items imported after the snapshot wait for the next run.

mod worker;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::failure_log::FailureLog;
use crate::fetch::{SegmentFetcher, remove_partial};
use crate::retry::RetryPolicy;
use crate::types::{RunSummary, Status, WorkItem};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use worker::{RunCounters, WorkerContext};

/// Bounded-concurrency download pass over the work-item store
pub struct Scheduler {
    db: Arc<Database>,
    fetcher: Arc<dyn SegmentFetcher>,
    failure_log: Arc<FailureLog>,
    storage_root: PathBuf,
    max_parallelism: usize,
    policy: RetryPolicy,
}

impl Scheduler {
    /// Create a scheduler with an unbounded retry policy
    ///
    /// A `max_parallelism` of zero is treated as one.
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<dyn SegmentFetcher>,
        failure_log: Arc<FailureLog>,
        storage_root: impl Into<PathBuf>,
        max_parallelism: usize,
    ) -> Self {
        Self {
            db,
            fetcher,
            failure_log,
            storage_root: storage_root.into(),
            max_parallelism: max_parallelism.max(1),
            policy: RetryPolicy::unbounded(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Directory segment files are written to
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Execute one scheduling pass
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        tokio::fs::create_dir_all(&self.storage_root).await?;

        let recovered = self.recover_stranded().await?;
        let (snapshot, exhausted) = self.take_snapshot().await?;

        let mut summary = RunSummary {
            recovered,
            exhausted,
            ..Default::default()
        };

        if snapshot.is_empty() {
            summary.elapsed = started.elapsed();
            tracing::info!(recovered, exhausted, "Nothing to download");
            return Ok(summary);
        }

        let workers = snapshot.len().min(self.max_parallelism);
        summary.workers = workers;
        tracing::info!(
            items = snapshot.len(),
            workers,
            max_parallelism = self.max_parallelism,
            "Starting download run"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(snapshot)));
        let counters = Arc::new(RunCounters::default());
        let cancel_token = CancellationToken::new();

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = WorkerContext {
                worker_id,
                db: Arc::clone(&self.db),
                fetcher: Arc::clone(&self.fetcher),
                failure_log: Arc::clone(&self.failure_log),
                storage_root: self.storage_root.clone(),
                policy: self.policy,
                queue: Arc::clone(&queue),
                counters: Arc::clone(&counters),
                cancel_token: cancel_token.clone(),
            };
            set.spawn(worker::run_worker(ctx));
        }

        let mut first_error: Option<Error> = None;
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Io(std::io::Error::other(format!(
                    "download worker panicked: {e}"
                )))),
            };
            if let Err(e) = outcome {
                cancel_token.cancel();
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        summary.attempted = counters.attempted.load(Ordering::Relaxed);
        summary.succeeded = counters.succeeded.load(Ordering::Relaxed);
        summary.failed = counters.failed.load(Ordering::Relaxed);
        summary.elapsed = started.elapsed();

        if let Some(e) = first_error {
            tracing::error!(
                error = %e,
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Download run aborted"
            );
            return Err(e);
        }

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Download run complete"
        );
        Ok(summary)
    }

    /// Sweep `Active` leftovers back to `Queued` and drop their partial files
    async fn recover_stranded(&self) -> Result<usize> {
        let recovered = self.db.recover_stranded().await?;

        for item in &recovered {
            tracing::warn!(id = %item.id, name = %item.name, "Recovered stranded item");
            remove_partial(&self.storage_root.join(&item.name)).await;
        }

        Ok(recovered.len())
    }

    /// Select eligible items and move them to `Queued`
    ///
    /// Returns the queued snapshot in id order and the number of failed
    /// items left out by the attempt cap.
    async fn take_snapshot(&self) -> Result<(Vec<WorkItem>, usize)> {
        let candidates = self.db.list_by_statuses(&Status::ELIGIBLE).await?;

        let mut snapshot = Vec::with_capacity(candidates.len());
        let mut exhausted = 0;

        for mut item in candidates {
            if !self.policy.is_eligible(&item) {
                if self.policy.is_exhausted(&item) {
                    tracing::debug!(
                        id = %item.id,
                        name = %item.name,
                        attempts = item.attempts,
                        "Skipping item that reached the attempt limit"
                    );
                    exhausted += 1;
                }
                continue;
            }

            if item.status != Status::Queued {
                self.db.set_status(item.id, Status::Queued).await?;
                item.status = Status::Queued;
            }
            snapshot.push(item);
        }

        Ok((snapshot, exhausted))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
