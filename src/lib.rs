//! # segment-dl
//!
//! Resumable downloader for segmented media streams.
//!
//! A playlist of segment URIs is imported into a SQLite-backed work-item
//! store. Each `run` downloads every eligible item with a bounded pool of
//! workers, and failed items are retried on the next run. Once everything is
//! on disk, the segments are concatenated in playlist order into one stream
//! file.
//!
//! ## Work-item lifecycle
//!
//! ```text
//! New -> Queued -> Active -> Completed
//!                     \
//!                      -> Failed -> Queued -> ...
//! ```
//!
//! Items found `Active` when a run starts belonged to an interrupted run and
//! are swept back to `Queued` before anything else happens.
//!
//! ## Quick Start
//!
//! ```no_run
//! use segment_dl::{Config, Database, FailureLog, HttpFetcher, Scheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.database).await?);
//!
//!     segment_dl::importer::import_file(&db, "playlist.m3u8".as_ref()).await?;
//!
//!     let scheduler = Scheduler::new(
//!         Arc::clone(&db),
//!         Arc::new(HttpFetcher::new(&config.download)?),
//!         Arc::new(FailureLog::new("logs/failed.csv")),
//!         &config.storage_dir,
//!         config.download.effective_parallelism(),
//!     );
//!     let summary = scheduler.run().await?;
//!     println!("{} completed, {} failed", summary.succeeded, summary.failed);
//!
//!     let order = segment_dl::assembler::assembly_order(&db, None).await?;
//!     segment_dl::assembler::assemble(&order, &config.storage_dir, "stream.ts".as_ref()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Playlist-ordered stream assembly
pub mod assembler;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Per-run failure log
pub mod failure_log;
/// Segment fetching over HTTP
pub mod fetch;
/// Playlist import
pub mod importer;
/// Operator maintenance commands
pub mod maintenance;
/// Retry and failure policy
pub mod retry;
/// Bounded-concurrency download scheduler
pub mod scheduler;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, ImportError, Result};
pub use failure_log::{FailureLog, FailureRecord};
pub use fetch::{HttpFetcher, SegmentFetcher};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use types::{
    DownloadOutcome, FetchErrorKind, RunSummary, Status, StatusCounts, WorkItem, WorkItemId,
};
