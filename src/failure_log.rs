//! Append-only failure log
//!
//! One CSV file per run with an `asset,error` header and one row per failed
//! fetch. The file is created on the first failure, so a clean run leaves no
//! file behind. Nothing in the crate reads it back.

use crate::error::Result;
use crate::types::FetchErrorKind;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const HEADER: &str = "asset,error\n";

/// One failed fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    /// Name of the work item that failed
    pub item_name: String,
    /// Classified failure
    pub error_kind: FetchErrorKind,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Record stamped with the current time
    pub fn now(item_name: impl Into<String>, error_kind: FetchErrorKind) -> Self {
        Self {
            item_name: item_name.into(),
            error_kind,
            timestamp: Utc::now(),
        }
    }

    fn to_csv_row(&self) -> String {
        format!("{},{}\n", csv_field(&self.item_name), self.error_kind)
    }
}

/// Per-run failure log shared by all workers
pub struct FailureLog {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
    written: AtomicUsize,
}

impl FailureLog {
    /// Log writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
            written: AtomicUsize::new(0),
        }
    }

    /// Log for a run started at `started`, named after the run's log file
    pub fn for_run(log_dir: &Path, started: DateTime<Local>) -> Self {
        Self::new(log_dir.join(format!(
            "segment-dl_{}_failed.csv",
            started.format("%Y%m%d_%H%M%S")
        )))
    }

    /// Where records are written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended through this handle
    pub fn records_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Append one record
    pub async fn append(&self, record: &FailureRecord) -> Result<()> {
        let mut guard = self.file.lock().await;

        if guard.is_none() {
            *guard = Some(self.open().await?);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(record.to_csv_row().as_bytes()).await?;
            file.flush().await?;
            self.written.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }

    async fn open(&self) -> Result<tokio::fs::File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        if file.metadata().await?.len() == 0 {
            file.write_all(HEADER.as_bytes()).await?;
        }

        tracing::debug!(path = %self.path.display(), "Opened failure log");
        Ok(file)
    }
}

/// Quote a CSV field when it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
