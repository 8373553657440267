//! Error types for segment-dl
//!
//! Per-segment fetch failures are not errors at this level: they are folded
//! into a [`DownloadOutcome`](crate::types::DownloadOutcome) and recorded by
//! the failure policy. Everything here aborts the operation that raised it.

use crate::types::{Status, WorkItemId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for segment-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segment-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage_dir")
        key: Option<String>,
    },

    /// Work-item store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Playlist import failed
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Requested status change is not in the transition table
    #[error("work item {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        /// The work item whose transition was rejected
        id: WorkItemId,
        /// Status the item held when the transition was attempted
        from: Status,
        /// Status that was requested
        to: Status,
    },

    /// A segment named in the playlist has no local file
    #[error("missing segment {name} at {path}")]
    MissingSegment {
        /// Segment name from the playlist
        name: String,
        /// Where the segment file was expected
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (empty or malformed uri, duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Playlist import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// The input file could not be opened or read
    #[error("cannot read {path}: {source}")]
    Unreadable {
        /// The input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A line looked like a URL but did not parse as one
    #[error("line {line}: invalid uri {uri:?}")]
    InvalidUri {
        /// 1-based line number in the input file
        line: usize,
        /// The offending text
        uri: String,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// True when the error came from the work-item store
    ///
    /// Store errors are fatal to a scheduler run.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Database(_) | Error::InvalidTransition { .. })
    }
}
