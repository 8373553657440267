//! Segment fetching
//!
//! [`SegmentFetcher`] is the contract the scheduler depends on;
//! [`HttpFetcher`] is the production implementation on top of reqwest.

mod http;
mod traits;

pub use http::HttpFetcher;
pub use traits::SegmentFetcher;

use std::io::ErrorKind;
use std::path::Path;

/// Remove a partially written segment file
///
/// A missing file is fine; any other error is logged and swallowed since the
/// caller is already on a failure path.
pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed partial segment file");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to remove partial segment file");
        }
    }
}
