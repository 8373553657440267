//! Operator maintenance commands

use crate::db::Database;
use crate::error::Result;
use crate::types::Status;
use std::io::ErrorKind;
use std::path::Path;

/// What `delete_terminal` removed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Rows removed from the store
    pub rows_deleted: usize,
    /// Segment files removed from storage
    pub files_removed: usize,
    /// Rows whose segment file was already gone
    pub files_missing: usize,
}

/// Remove `Completed` and `Failed` rows along with their segment files
pub async fn delete_terminal(db: &Database, storage_root: &Path) -> Result<DeleteReport> {
    let items = db
        .list_by_statuses(&[Status::Completed, Status::Failed])
        .await?;
    let mut report = DeleteReport::default();

    for item in items {
        db.delete_work_item(item.id).await?;
        report.rows_deleted += 1;

        let path = storage_root.join(&item.name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(id = %item.id, path = %path.display(), "Deleted segment");
                report.files_removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(id = %item.id, path = %path.display(), "Segment file not found");
                report.files_missing += 1;
            }
            Err(e) => {
                tracing::error!(id = %item.id, path = %path.display(), error = %e, "Failed to delete segment file");
            }
        }
    }

    tracing::info!(
        rows = report.rows_deleted,
        files = report.files_removed,
        missing = report.files_missing,
        "Deleted terminal items"
    );
    Ok(report)
}

/// Drop every work item
///
/// Segment files on disk are left alone.
pub async fn purge(db: &Database) -> Result<()> {
    db.purge_all().await?;
    tracing::info!("Work-item store purged");
    Ok(())
}
