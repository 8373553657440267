//! Stream assembly
//!
//! Concatenates downloaded segment files in playlist order into one output
//! file. Every segment must be present before a single byte is written, and
//! the output only appears at its final path once it is complete.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::importer;
use crate::types::Status;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Segment names in the order they should be concatenated
///
/// With a playlist, the order is the playlist's. Without one it is the
/// `Completed` items in import order.
pub async fn assembly_order(db: &Database, playlist: Option<&Path>) -> Result<Vec<String>> {
    match playlist {
        Some(path) => {
            let entries = importer::read_playlist(path).await?;
            Ok(entries.into_iter().map(|e| e.name).collect())
        }
        None => {
            let counts = db.status_counts().await?;
            let pending = counts.total() - counts.completed;
            if pending > 0 {
                tracing::warn!(
                    pending,
                    completed = counts.completed,
                    "Not every segment is completed; the stream will have gaps"
                );
            }

            let items = db.list_by_status(Status::Completed).await?;
            Ok(items.into_iter().map(|i| i.name).collect())
        }
    }
}

/// Concatenate `order` from `storage_root` into `output`
///
/// Returns the number of bytes written. Fails with
/// [`Error::MissingSegment`] before touching `output` if any segment file is
/// absent.
pub async fn assemble(order: &[String], storage_root: &Path, output: &Path) -> Result<u64> {
    let mut sources = Vec::with_capacity(order.len());
    for name in order {
        let path = storage_root.join(name);
        let present = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !present {
            tracing::error!(name = %name, path = %path.display(), "Segment file missing");
            return Err(Error::MissingSegment {
                name: name.clone(),
                path,
            });
        }
        sources.push(path);
    }

    let staging = staging_path(output);
    match write_concatenated(&sources, &staging).await {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::rename(&staging, output).await {
                discard(&staging).await;
                return Err(e.into());
            }
            tracing::info!(
                output = %output.display(),
                segments = sources.len(),
                bytes,
                "Stream assembled"
            );
            Ok(bytes)
        }
        Err(e) => {
            discard(&staging).await;
            Err(e)
        }
    }
}

async fn write_concatenated(sources: &[PathBuf], staging: &Path) -> Result<u64> {
    if let Some(parent) = staging.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut out = tokio::fs::File::create(staging).await?;
    let mut total: u64 = 0;

    for source in sources {
        let mut input = tokio::fs::File::open(source).await?;
        total += tokio::io::copy(&mut input, &mut out).await?;
    }

    out.flush().await?;
    out.sync_all().await?;
    Ok(total)
}

/// Hidden sibling of `output` used while writing
fn staging_path(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stream".to_string());
    output.with_file_name(format!(".{file_name}.partial"))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging file");
    }
}
