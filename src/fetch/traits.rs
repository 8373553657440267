//! Fetch seam between the scheduler and the network

use crate::types::DownloadOutcome;
use async_trait::async_trait;
use std::path::Path;

/// Downloads one segment to a local file
///
/// Implementations must never leave a partial or empty file at
/// `destination` when they report failure, and must write exactly one
/// non-empty file when they report success.
///
/// # Examples
///
/// ```no_run
/// use segment_dl::config::DownloadConfig;
/// use segment_dl::fetch::{HttpFetcher, SegmentFetcher};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = HttpFetcher::new(&DownloadConfig::default())?;
/// let outcome = fetcher
///     .fetch("https://cdn.example.com/seg-001.ts", Path::new("files/seg-001.ts"))
///     .await;
/// println!("success: {}", outcome.success);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// GET `uri` and stream the body into `destination`
    async fn fetch(&self, uri: &str, destination: &Path) -> DownloadOutcome;
}
