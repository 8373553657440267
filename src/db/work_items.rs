//! Work-item CRUD and status transitions.

use crate::error::DatabaseError;
use crate::types::{Status, StatusCounts, WorkItem, WorkItemId};
use crate::{Error, Result};

use super::{Database, WorkItemRow};

const SELECT_COLUMNS: &str = "id, name, uri, status, attempts, created_at, updated_at";

/// Check that `uri` is an absolute http(s) URL with a host
pub(crate) fn validate_uri(uri: &str) -> std::result::Result<url::Url, String> {
    if uri.trim().is_empty() {
        return Err("uri is empty".to_string());
    }
    let parsed = url::Url::parse(uri).map_err(|e| format!("malformed uri {:?}: {}", uri, e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {:?} in {:?}", other, uri)),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(format!("uri {:?} has no host", uri));
    }
    Ok(parsed)
}

fn rows_to_items(rows: Vec<WorkItemRow>) -> Result<Vec<WorkItem>> {
    rows.into_iter().map(WorkItem::try_from).collect()
}

impl Database {
    /// Insert a new work item in status `New`
    ///
    /// Fails with [`DatabaseError::ConstraintViolation`] when the uri is empty
    /// or malformed, the name is empty, or the name is already taken.
    pub async fn insert_work_item(&self, name: &str, uri: &str) -> Result<WorkItemId> {
        validate_uri(uri).map_err(|msg| Error::Database(DatabaseError::ConstraintViolation(msg)))?;
        if name.trim().is_empty() {
            return Err(Error::Database(DatabaseError::ConstraintViolation(
                format!("empty name for uri {:?}", uri),
            )));
        }

        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO work_items (name, uri, status, attempts, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(name)
        .bind(uri)
        .bind(Status::New.to_i32())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation());
            if unique {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "duplicate work item name {:?}",
                    name
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert work item: {}",
                    e
                )))
            }
        })?;

        Ok(WorkItemId(result.last_insert_rowid()))
    }

    /// Get a work item by ID
    pub async fn get_work_item(&self, id: WorkItemId) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, WorkItemRow>(&format!(
            "SELECT {} FROM work_items WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get work item: {}",
                e
            )))
        })?;

        row.map(WorkItem::try_from).transpose()
    }

    /// List all work items in insertion order
    pub async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, WorkItemRow>(&format!(
            "SELECT {} FROM work_items ORDER BY id ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list work items: {}",
                e
            )))
        })?;

        rows_to_items(rows)
    }

    /// List work items with a specific status, in insertion order
    pub async fn list_by_status(&self, status: Status) -> Result<Vec<WorkItem>> {
        self.list_by_statuses(&[status]).await
    }

    /// List work items whose status is any of `statuses`, in insertion order
    pub async fn list_by_statuses(&self, statuses: &[Status]) -> Result<Vec<WorkItem>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM work_items WHERE status IN ({}) ORDER BY id ASC",
            SELECT_COLUMNS, placeholders
        );

        let mut query = sqlx::query_as::<_, WorkItemRow>(&sql);
        for status in statuses {
            query = query.bind(status.to_i32());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list work items by status: {}",
                e
            )))
        })?;

        rows_to_items(rows)
    }

    /// Move a work item to `status`
    ///
    /// The check and the write are one `UPDATE ... WHERE status IN (...)`
    /// statement, so two writers racing on the same row cannot both succeed.
    /// Entering `Active` increments the attempt counter. A transition outside
    /// the table fails with [`Error::InvalidTransition`] and leaves the row
    /// untouched.
    pub async fn set_status(&self, id: WorkItemId, status: Status) -> Result<()> {
        let predecessors = Status::predecessors(status);

        if !predecessors.is_empty() {
            let now = chrono::Utc::now().timestamp();
            let placeholders = vec!["?"; predecessors.len()].join(", ");
            let sql = format!(
                "UPDATE work_items SET status = ?, attempts = attempts + ?, updated_at = ? \
                 WHERE id = ? AND status IN ({})",
                placeholders
            );

            let mut query = sqlx::query(&sql)
                .bind(status.to_i32())
                .bind(i64::from(status == Status::Active))
                .bind(now)
                .bind(id);
            for from in &predecessors {
                query = query.bind(from.to_i32());
            }

            let result = query.execute(&self.pool).await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update status: {}",
                    e
                )))
            })?;

            if result.rows_affected() == 1 {
                return Ok(());
            }
        }

        match self.get_work_item(id).await? {
            Some(item) => Err(Error::InvalidTransition {
                id,
                from: item.status,
                to: status,
            }),
            None => Err(Error::Database(DatabaseError::NotFound(format!(
                "work item {}",
                id
            )))),
        }
    }

    /// Sweep every `Active` item back to `Queued`
    ///
    /// Items left `Active` by a process that exited mid-run cannot be told
    /// apart from in-flight ones, so this runs before a scheduler snapshot.
    /// Returns the swept items (with their new status).
    pub async fn recover_stranded(&self) -> Result<Vec<WorkItem>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin recovery transaction: {}",
                e
            )))
        })?;

        let rows = sqlx::query_as::<_, WorkItemRow>(&format!(
            "SELECT {} FROM work_items WHERE status = ? ORDER BY id ASC",
            SELECT_COLUMNS
        ))
        .bind(Status::Active.to_i32())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list stranded work items: {}",
                e
            )))
        })?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE work_items SET status = ?, updated_at = ? WHERE status = ?")
            .bind(Status::Queued.to_i32())
            .bind(now)
            .bind(Status::Active.to_i32())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to recover stranded work items: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit recovery: {}",
                e
            )))
        })?;

        let mut items = rows_to_items(rows)?;
        for item in &mut items {
            item.status = Status::Queued;
        }
        Ok(items)
    }

    /// Count work items per status
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(i32, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM work_items GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count work items: {}",
                        e
                    )))
                })?;

        let mut counts = StatusCounts::default();
        for (code, n) in rows {
            match Status::from_i32(code) {
                Some(status) => counts.add(status, n as usize),
                None => tracing::warn!(code, count = n, "Ignoring rows with unknown status code"),
            }
        }
        Ok(counts)
    }

    /// Delete a work item
    pub async fn delete_work_item(&self, id: WorkItemId) -> Result<()> {
        sqlx::query("DELETE FROM work_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete work item: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
