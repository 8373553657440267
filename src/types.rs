//! Core types for segment-dl

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a work item
///
/// Assigned by the store at insertion and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub i64);

impl WorkItemId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for WorkItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for WorkItemId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for WorkItemId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for WorkItemId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Work item status
///
/// Stored as an integer column; the codes below are the only authoritative
/// mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Imported, never scheduled
    New,
    /// Part of a run snapshot, waiting for a worker
    Queued,
    /// A worker is fetching it
    Active,
    /// Local file present and non-empty
    Completed,
    /// Last attempt failed; eligible for the next run
    Failed,
}

impl Status {
    /// All statuses in lifecycle order
    pub const ALL: [Status; 5] = [
        Status::New,
        Status::Queued,
        Status::Active,
        Status::Completed,
        Status::Failed,
    ];

    /// Statuses picked up by a scheduler snapshot
    pub const ELIGIBLE: [Status; 3] = [Status::New, Status::Queued, Status::Failed];

    /// Convert integer status code to Status enum
    ///
    /// Returns `None` for codes this build does not know.
    pub fn from_i32(status: i32) -> Option<Self> {
        match status {
            0 => Some(Status::New),
            1 => Some(Status::Queued),
            2 => Some(Status::Active),
            3 => Some(Status::Completed),
            4 => Some(Status::Failed),
            _ => None,
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::New => 0,
            Status::Queued => 1,
            Status::Active => 2,
            Status::Completed => 3,
            Status::Failed => 4,
        }
    }

    /// Whether `self -> next` is in the transition table
    ///
    /// `Completed` has no outgoing edge. The startup sweep `Active -> Queued`
    /// is not an ordinary transition and goes through
    /// [`Database::recover_stranded`](crate::db::Database::recover_stranded).
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::New, Status::Queued)
                | (Status::Queued, Status::Active)
                | (Status::Active, Status::Completed)
                | (Status::Active, Status::Failed)
                | (Status::Failed, Status::Queued)
        )
    }

    /// Statuses allowed to move into `next`
    pub fn predecessors(next: Status) -> Vec<Status> {
        Status::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Whether this status is terminal (`Completed` hard, `Failed` soft)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::New => "new",
            Status::Queued => "queued",
            Status::Active => "active",
            Status::Completed => "completed",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One segment download task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Stable identity
    pub id: WorkItemId,
    /// Final path segment of the uri; names the local file
    pub name: String,
    /// Absolute source URL
    pub uri: String,
    /// Current lifecycle status
    pub status: Status,
    /// Number of times the item has been made `Active`
    pub attempts: u32,
}

/// Classification of a failed fetch attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchErrorKind {
    /// TCP/TLS connection could not be established within the connect timeout
    ConnectFailed,
    /// Server answered with a non-2xx status (redirects included)
    HttpStatus,
    /// Any other failure while sending, receiving or writing the body
    TransferFailed,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::ConnectFailed => "ConnectFailed",
            FetchErrorKind::HttpStatus => "HttpStatus",
            FetchErrorKind::TransferFailed => "TransferFailed",
        };
        f.write_str(s)
    }
}

/// Result of one fetch attempt
///
/// Never persisted; the scheduler folds it into a status transition.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Whether the segment landed on disk
    pub success: bool,
    /// Bytes written to the destination file
    pub bytes_written: u64,
    /// Failure classification, `None` on success
    pub error_kind: Option<FetchErrorKind>,
    /// Wall time of the attempt
    pub elapsed: Duration,
}

impl DownloadOutcome {
    /// Successful attempt
    pub fn succeeded(bytes_written: u64, elapsed: Duration) -> Self {
        Self {
            success: true,
            bytes_written,
            error_kind: None,
            elapsed,
        }
    }

    /// Failed attempt
    pub fn failed(kind: FetchErrorKind, elapsed: Duration) -> Self {
        Self {
            success: false,
            bytes_written: 0,
            error_kind: Some(kind),
            elapsed,
        }
    }
}

/// Counters reported by one scheduler run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items dispatched to workers
    pub attempted: usize,
    /// Items that ended `Completed`
    pub succeeded: usize,
    /// Items that ended `Failed`
    pub failed: usize,
    /// Failed items skipped because they hit the attempt cap
    pub exhausted: usize,
    /// Items swept from `Active` back to `Queued` at startup
    pub recovered: usize,
    /// Number of workers started
    pub workers: usize,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Per-status row counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Items in `New`
    pub new: usize,
    /// Items in `Queued`
    pub queued: usize,
    /// Items in `Active`
    pub active: usize,
    /// Items in `Completed`
    pub completed: usize,
    /// Items in `Failed`
    pub failed: usize,
}

impl StatusCounts {
    /// Count for a single status
    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::New => self.new,
            Status::Queued => self.queued,
            Status::Active => self.active,
            Status::Completed => self.completed,
            Status::Failed => self.failed,
        }
    }

    /// Increment the counter for `status`
    pub fn add(&mut self, status: Status, n: usize) {
        match status {
            Status::New => self.new += n,
            Status::Queued => self.queued += n,
            Status::Active => self.active += n,
            Status::Completed => self.completed += n,
            Status::Failed => self.failed += n,
        }
    }

    /// Total number of rows
    pub fn total(&self) -> usize {
        self.new + self.queued + self.active + self.completed + self.failed
    }
}
