//! Playlist import
//!
//! Line-based: any line starting with `http` is a segment URI, everything
//! else (blank lines, `#EXT` tags, comments) is skipped. No M3U8 semantics
//! beyond that.

use crate::db::Database;
use crate::error::{DatabaseError, Error, ImportError, Result};
use std::path::Path;

/// One segment URI taken from a playlist
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Final path segment of the uri, query string stripped
    pub name: String,
    /// The uri as written in the playlist (trimmed)
    pub uri: String,
}

/// What an import did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows created
    pub inserted: usize,
    /// Entries whose name was already present in the store
    pub skipped: usize,
}

/// Derive the local segment name from a uri
///
/// Returns `None` when the uri does not parse or has no final path segment.
pub fn segment_name(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// Parse playlist text into entries, in playlist order
pub fn parse_playlist(text: &str) -> std::result::Result<Vec<PlaylistEntry>, ImportError> {
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if !line.starts_with("http") {
            continue;
        }

        let name = match crate::db::validate_uri(line) {
            Ok(_) => segment_name(line),
            Err(_) => None,
        };

        match name {
            Some(name) => entries.push(PlaylistEntry {
                name,
                uri: line.to_string(),
            }),
            None => {
                return Err(ImportError::InvalidUri {
                    line: idx + 1,
                    uri: line.to_string(),
                });
            }
        }
    }

    Ok(entries)
}

/// Read and parse a playlist file
pub async fn read_playlist(path: &Path) -> std::result::Result<Vec<PlaylistEntry>, ImportError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    parse_playlist(&text)
}

/// Insert entries as `New` work items
///
/// Entries whose name already exists are skipped, which makes re-importing
/// the same playlist a no-op.
pub async fn import_entries<I>(db: &Database, entries: I) -> Result<ImportReport>
where
    I: IntoIterator<Item = PlaylistEntry>,
{
    let mut report = ImportReport::default();

    for entry in entries {
        match db.insert_work_item(&entry.name, &entry.uri).await {
            Ok(id) => {
                tracing::debug!(id = %id, name = %entry.name, uri = %entry.uri, "Imported segment");
                report.inserted += 1;
            }
            Err(Error::Database(DatabaseError::ConstraintViolation(reason))) => {
                tracing::warn!(name = %entry.name, %reason, "Skipping segment");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Import a playlist file into the store
///
/// The whole file is parsed before anything is inserted, so a malformed
/// line leaves the store untouched.
pub async fn import_file(db: &Database, path: &Path) -> Result<ImportReport> {
    let entries = read_playlist(path).await?;
    tracing::info!(path = %path.display(), entries = entries.len(), "Importing playlist");

    let report = import_entries(db, entries).await?;
    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "Import complete"
    );
    Ok(report)
}
