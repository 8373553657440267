//! Download worker loop

use crate::db::Database;
use crate::error::Result;
use crate::failure_log::FailureLog;
use crate::fetch::SegmentFetcher;
use crate::retry::RetryPolicy;
use crate::types::{FetchErrorKind, Status, WorkItem};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Per-run counters shared by all workers
#[derive(Default)]
pub(super) struct RunCounters {
    pub(super) attempted: AtomicUsize,
    pub(super) succeeded: AtomicUsize,
    pub(super) failed: AtomicUsize,
}

/// Everything one worker needs
pub(super) struct WorkerContext {
    pub(super) worker_id: usize,
    pub(super) db: Arc<Database>,
    pub(super) fetcher: Arc<dyn SegmentFetcher>,
    pub(super) failure_log: Arc<FailureLog>,
    pub(super) storage_root: PathBuf,
    pub(super) policy: RetryPolicy,
    pub(super) queue: Arc<Mutex<VecDeque<WorkItem>>>,
    pub(super) counters: Arc<RunCounters>,
    pub(super) cancel_token: CancellationToken,
}

/// Pull items until the queue is empty or the run is cancelled
pub(super) async fn run_worker(ctx: WorkerContext) -> Result<()> {
    tracing::debug!(worker = ctx.worker_id, "Worker started");

    loop {
        if ctx.cancel_token.is_cancelled() {
            tracing::debug!(worker = ctx.worker_id, "Worker stopping after cancellation");
            break;
        }

        let next = {
            let mut queue = ctx.queue.lock().await;
            queue.pop_front()
        };
        let Some(item) = next else { break };

        if let Err(e) = process_item(&ctx, item).await {
            ctx.cancel_token.cancel();
            return Err(e);
        }
    }

    tracing::debug!(worker = ctx.worker_id, "Worker finished");
    Ok(())
}

/// Drive one item through `Active` to a terminal status
async fn process_item(ctx: &WorkerContext, mut item: WorkItem) -> Result<()> {
    ctx.db.set_status(item.id, Status::Active).await?;
    item.status = Status::Active;
    item.attempts = item.attempts.saturating_add(1);
    ctx.counters.attempted.fetch_add(1, Ordering::Relaxed);

    let destination = ctx.storage_root.join(&item.name);
    let outcome = ctx.fetcher.fetch(&item.uri, &destination).await;

    if outcome.success {
        ctx.db.set_status(item.id, Status::Completed).await?;
        ctx.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            worker = ctx.worker_id,
            id = %item.id,
            name = %item.name,
            bytes = outcome.bytes_written,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Segment completed"
        );
        return Ok(());
    }

    let kind = outcome.error_kind.unwrap_or(FetchErrorKind::TransferFailed);
    ctx.db.set_status(item.id, Status::Failed).await?;
    ctx.counters.failed.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = ctx
        .policy
        .record_failure(&ctx.failure_log, &item, kind)
        .await
    {
        tracing::error!(
            id = %item.id,
            name = %item.name,
            path = %ctx.failure_log.path().display(),
            error = %e,
            "Failed to append failure record"
        );
    }

    Ok(())
}
