//! Retry and failure policy
//!
//! There is no in-process retry loop. A failed item is picked up again by the
//! next `run`, so every run doubles as a retry pass for everything not yet
//! completed. An optional attempt cap keeps permanently broken items out of
//! later snapshots.

use crate::config::RetryConfig;
use crate::error::Result;
use crate::failure_log::{FailureLog, FailureRecord};
use crate::types::{FetchErrorKind, Status, WorkItem};

/// Decides which items a run may take and records failed attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Policy built from the `[retry]` config section
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
        }
    }

    /// Retry forever
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Policy that stops retrying after `max_attempts` fetches
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    /// Configured cap, if any
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether `item` belongs in the next run's snapshot
    ///
    /// `New` and `Queued` items always do. `Failed` items do unless they have
    /// used up the attempt cap.
    pub fn is_eligible(&self, item: &WorkItem) -> bool {
        match item.status {
            Status::New | Status::Queued => true,
            Status::Failed => !self.is_exhausted(item),
            Status::Active | Status::Completed => false,
        }
    }

    /// Whether a `Failed` item has hit the attempt cap
    pub fn is_exhausted(&self, item: &WorkItem) -> bool {
        item.status == Status::Failed
            && self
                .max_attempts
                .is_some_and(|max| item.attempts >= max)
    }

    /// Append a failure record for `item` and log it
    pub async fn record_failure(
        &self,
        log: &FailureLog,
        item: &WorkItem,
        kind: FetchErrorKind,
    ) -> Result<FailureRecord> {
        let record = FailureRecord::now(item.name.clone(), kind);

        tracing::warn!(
            id = %item.id,
            name = %item.name,
            uri = %item.uri,
            error_kind = %kind,
            attempts = item.attempts,
            timestamp = %record.timestamp.to_rfc3339(),
            "Segment download failed"
        );

        log.append(&record).await?;
        Ok(record)
    }
}
