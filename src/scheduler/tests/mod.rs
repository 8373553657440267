use super::*;
use crate::types::{DownloadOutcome, FetchErrorKind, WorkItemId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Mock fetcher
// ---------------------------------------------------------------------------

/// Fetcher that writes a fixed body, or fails for selected names
struct MockFetcher {
    body: Vec<u8>,
    fail_all: Option<FetchErrorKind>,
    fail_names: HashSet<String>,
    delay: Duration,
    calls: std::sync::Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFetcher {
    fn succeeding(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            fail_all: None,
            fail_names: HashSet::new(),
            delay: Duration::ZERO,
            calls: std::sync::Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn failing(kind: FetchErrorKind) -> Self {
        Self {
            fail_all: Some(kind),
            ..Self::succeeding(b"")
        }
    }

    fn failing_names(body: &[u8], names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::succeeding(body)
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentFetcher for MockFetcher {
    async fn fetch(&self, uri: &str, destination: &Path) -> DownloadOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().unwrap().push(uri.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.fail_all.or_else(|| {
            self.fail_names
                .contains(&name)
                .then_some(FetchErrorKind::HttpStatus)
        });

        let outcome = match failure {
            Some(kind) => DownloadOutcome::failed(kind, self.delay),
            None => {
                tokio::fs::write(destination, &self.body).await.unwrap();
                DownloadOutcome::succeeded(self.body.len() as u64, self.delay)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    db: Arc<Database>,
    failure_log: Arc<FailureLog>,
    storage: PathBuf,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("segments.db")).await.unwrap();
        let failure_log = FailureLog::new(dir.path().join("logs/run_failed.csv"));
        Self {
            db: Arc::new(db),
            failure_log: Arc::new(failure_log),
            storage: dir.path().join("files"),
            _dir: dir,
        }
    }

    async fn insert(&self, names: &[&str]) -> Vec<WorkItemId> {
        let mut ids = Vec::new();
        for name in names {
            ids.push(
                self.db
                    .insert_work_item(name, &format!("https://cdn.example.com/live/{name}"))
                    .await
                    .unwrap(),
            );
        }
        ids
    }

    fn scheduler(&self, fetcher: Arc<MockFetcher>, max_parallelism: usize) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.db),
            fetcher,
            Arc::clone(&self.failure_log),
            self.storage.clone(),
            max_parallelism,
        )
    }

    async fn status_of(&self, id: WorkItemId) -> Status {
        self.db.get_work_item(id).await.unwrap().unwrap().status
    }

    fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.storage)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn failure_rows(&self) -> Vec<String> {
        match std::fs::read_to_string(self.failure_log.path()) {
            Ok(text) => text.lines().skip(1).map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_completes_all_items() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts", "c.ts"]).await;
    let fetcher = Arc::new(MockFetcher::succeeding(b"DATA"));

    let summary = h.scheduler(fetcher.clone(), 4).run().await.unwrap();

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.workers, 3);
    for id in ids {
        assert_eq!(h.status_of(id).await, Status::Completed);
    }
    assert_eq!(h.stored_files(), vec!["a.ts", "b.ts", "c.ts"]);
    assert_eq!(std::fs::read(h.storage.join("b.ts")).unwrap(), b"DATA");
    assert!(!h.failure_log.path().exists(), "clean run writes no failure log");
}

#[tokio::test]
async fn test_failing_run_records_each_failure_and_leaves_no_files() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts", "c.ts"]).await;
    let fetcher = Arc::new(MockFetcher::failing(FetchErrorKind::ConnectFailed));

    let summary = h.scheduler(fetcher, 2).run().await.unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.succeeded, 0);
    for id in ids {
        assert_eq!(h.status_of(id).await, Status::Failed);
    }

    let mut rows = h.failure_rows();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            "a.ts,ConnectFailed",
            "b.ts,ConnectFailed",
            "c.ts,ConnectFailed"
        ]
    );
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn test_mixed_outcomes() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts", "c.ts"]).await;
    let fetcher = Arc::new(MockFetcher::failing_names(b"X", &["b.ts"]));

    let summary = h.scheduler(fetcher, 3).run().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.status_of(ids[0]).await, Status::Completed);
    assert_eq!(h.status_of(ids[1]).await, Status::Failed);
    assert_eq!(h.status_of(ids[2]).await, Status::Completed);
    assert_eq!(h.failure_rows(), vec!["b.ts,HttpStatus"]);
}

#[tokio::test]
async fn test_failed_items_are_retried_on_next_run() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts"]).await;

    let first = h
        .scheduler(Arc::new(MockFetcher::failing(FetchErrorKind::HttpStatus)), 2)
        .run()
        .await
        .unwrap();
    assert_eq!(first.failed, 2);

    let second = h
        .scheduler(Arc::new(MockFetcher::succeeding(b"OK")), 2)
        .run()
        .await
        .unwrap();
    assert_eq!(second.attempted, 2);
    assert_eq!(second.succeeded, 2);

    for id in ids {
        let item = h.db.get_work_item(id).await.unwrap().unwrap();
        assert_eq!(item.status, Status::Completed);
        assert_eq!(item.attempts, 2);
    }
}

#[tokio::test]
async fn test_completed_items_are_not_refetched() {
    let h = Harness::new().await;
    h.insert(&["a.ts", "b.ts"]).await;

    h.scheduler(Arc::new(MockFetcher::succeeding(b"1")), 2)
        .run()
        .await
        .unwrap();

    let fetcher = Arc::new(MockFetcher::succeeding(b"2"));
    let summary = h.scheduler(fetcher.clone(), 2).run().await.unwrap();

    assert_eq!(summary, RunSummary {
        elapsed: summary.elapsed,
        ..Default::default()
    });
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(std::fs::read(h.storage.join("a.ts")).unwrap(), b"1");
}

#[tokio::test]
async fn test_empty_store_starts_no_workers() {
    let h = Harness::new().await;
    let fetcher = Arc::new(MockFetcher::succeeding(b"x"));

    let summary = h.scheduler(fetcher.clone(), 8).run().await.unwrap();

    assert_eq!(summary.workers, 0);
    assert_eq!(summary.attempted, 0);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_stranded_active_items_are_recovered() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts"]).await;

    // Simulate a crash mid-transfer: Active row plus a truncated file
    h.db.set_status(ids[0], Status::Queued).await.unwrap();
    h.db.set_status(ids[0], Status::Active).await.unwrap();
    std::fs::create_dir_all(&h.storage).unwrap();
    std::fs::write(h.storage.join("a.ts"), b"trunc").unwrap();

    let summary = h
        .scheduler(Arc::new(MockFetcher::succeeding(b"FULL")), 2)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(std::fs::read(h.storage.join("a.ts")).unwrap(), b"FULL");

    let item = h.db.get_work_item(ids[0]).await.unwrap().unwrap();
    assert_eq!(item.status, Status::Completed);
    assert_eq!(item.attempts, 2);
}

#[tokio::test]
async fn test_worker_count_is_bounded_by_snapshot_size() {
    let h = Harness::new().await;
    h.insert(&["a.ts", "b.ts", "c.ts"]).await;
    let fetcher =
        Arc::new(MockFetcher::succeeding(b"x").with_delay(Duration::from_millis(20)));

    let summary = h.scheduler(fetcher.clone(), 8).run().await.unwrap();

    assert_eq!(summary.workers, 3);
    assert!(fetcher.peak() <= 3, "peak concurrency {}", fetcher.peak());
}

#[tokio::test]
async fn test_concurrency_never_exceeds_max_parallelism() {
    let h = Harness::new().await;
    let names: Vec<String> = (0..10).map(|i| format!("seg-{i:02}.ts")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    h.insert(&refs).await;
    let fetcher =
        Arc::new(MockFetcher::succeeding(b"x").with_delay(Duration::from_millis(10)));

    let summary = h.scheduler(fetcher.clone(), 2).run().await.unwrap();

    assert_eq!(summary.workers, 2);
    assert_eq!(summary.succeeded, 10);
    assert_eq!(fetcher.call_count(), 10);
    assert!(fetcher.peak() <= 2, "peak concurrency {}", fetcher.peak());
}

#[tokio::test]
async fn test_attempt_cap_excludes_exhausted_items() {
    let h = Harness::new().await;
    let ids = h.insert(&["a.ts", "b.ts"]).await;

    let first = h
        .scheduler(Arc::new(MockFetcher::failing_names(b"x", &["a.ts"])), 2)
        .with_retry_policy(RetryPolicy::with_max_attempts(1))
        .run()
        .await
        .unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.succeeded, 1);

    let fetcher = Arc::new(MockFetcher::succeeding(b"x"));
    let second = h
        .scheduler(fetcher.clone(), 2)
        .with_retry_policy(RetryPolicy::with_max_attempts(1))
        .run()
        .await
        .unwrap();

    assert_eq!(second.exhausted, 1);
    assert_eq!(second.attempted, 0);
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(h.status_of(ids[0]).await, Status::Failed);
}

#[tokio::test]
async fn test_zero_parallelism_is_clamped_to_one() {
    let h = Harness::new().await;
    h.insert(&["a.ts", "b.ts"]).await;

    let summary = h
        .scheduler(Arc::new(MockFetcher::succeeding(b"x")), 0)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.workers, 1);
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_store_failure_aborts_run() {
    let h = Harness::new().await;
    h.insert(&["a.ts"]).await;
    h.db.pool().close().await;

    let err = h
        .scheduler(Arc::new(MockFetcher::succeeding(b"x")), 2)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_store_error(), "unexpected error: {err:?}");
}

/// Fetcher that loses the store while a segment is in flight
struct ClosingFetcher {
    db: Arc<Database>,
    calls: AtomicUsize,
}

#[async_trait]
impl SegmentFetcher for ClosingFetcher {
    async fn fetch(&self, _uri: &str, destination: &Path) -> DownloadOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.db.pool().close().await;
        tokio::fs::write(destination, b"x").await.unwrap();
        DownloadOutcome::succeeded(1, Duration::ZERO)
    }
}

async fn run_with_closing_fetcher(
    items: &[&str],
    max_parallelism: usize,
) -> (Result<RunSummary>, usize) {
    let h = Harness::new().await;
    h.insert(items).await;
    let fetcher = Arc::new(ClosingFetcher {
        db: Arc::clone(&h.db),
        calls: AtomicUsize::new(0),
    });

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Scheduler::new(
            Arc::clone(&h.db),
            fetcher.clone(),
            Arc::clone(&h.failure_log),
            h.storage.clone(),
            max_parallelism,
        )
        .run(),
    )
    .await
    .expect("run must not hang after a store failure");

    (result, fetcher.calls.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_store_failure_mid_run_stops_worker() {
    let (result, calls) = run_with_closing_fetcher(&["a.ts", "b.ts", "c.ts", "d.ts"], 1).await;

    let err = result.unwrap_err();
    assert!(err.is_store_error(), "unexpected error: {err:?}");
    assert_eq!(calls, 1, "no item is fetched after the store fails");
}

#[tokio::test]
async fn test_store_failure_mid_run_cancels_other_workers() {
    let items = ["a.ts", "b.ts", "c.ts", "d.ts", "e.ts", "f.ts"];
    let (result, calls) = run_with_closing_fetcher(&items, 2).await;

    assert!(result.unwrap_err().is_store_error());
    assert!(calls <= 2, "each worker stops after its in-flight item, got {calls}");
}
