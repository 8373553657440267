//! Database layer for segment-dl
//!
//! Handles SQLite persistence for the work-item table. Status changes are
//! single-statement compare-and-set updates, so concurrent workers never
//! apply conflicting transitions to the same row.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations, purge
//! - [`work_items`]: Work-item CRUD and status transitions

use crate::error::DatabaseError;
use crate::types::{Status, WorkItem, WorkItemId};
use crate::{Error, Result};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod work_items;

pub(crate) use work_items::validate_uri;

/// Work item row from database
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    /// Unique database ID
    pub id: i64,
    /// Segment name (final path segment of the uri)
    pub name: String,
    /// Source URL
    pub uri: String,
    /// Status code (see [`Status::to_i32`])
    pub status: i32,
    /// Number of times the item went `Active`
    pub attempts: i64,
    /// Unix timestamp when the item was imported
    pub created_at: i64,
    /// Unix timestamp of the last status change
    pub updated_at: i64,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = Error;

    fn try_from(row: WorkItemRow) -> Result<Self> {
        let status = Status::from_i32(row.status).ok_or_else(|| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "work item {} has unknown status code {}",
                row.id, row.status
            )))
        })?;

        Ok(WorkItem {
            id: WorkItemId(row.id),
            name: row.name,
            uri: row.uri,
            status,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
        })
    }
}

/// Database handle for segment-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
