//! reqwest-backed segment fetcher

use super::{SegmentFetcher, remove_partial};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{DownloadOutcome, FetchErrorKind};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONNECTION, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// HTTP fetcher
///
/// Redirects are not followed: a 3xx is reported as an HTTP status failure.
/// Only connection establishment is time-limited; a slow but live transfer
/// runs to completion.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher from the `[download]` config section
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::config("download.headers", format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                Error::config(
                    "download.headers",
                    format!("invalid value for header '{name}': {e}"),
                )
            })?;
            headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    async fn try_fetch(
        &self,
        uri: &str,
        destination: &Path,
    ) -> std::result::Result<u64, FetchErrorKind> {
        let mut response = self.client.get(uri).send().await.map_err(|e| {
            let kind = classify_send_error(&e);
            tracing::warn!(uri, error = %e, kind = %kind, "Request failed");
            kind
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(uri, status = status.as_u16(), "Server returned non-success status");
            return Err(FetchErrorKind::HttpStatus);
        }

        let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
            tracing::error!(path = %destination.display(), error = %e, "Failed to create segment file");
            FetchErrorKind::TransferFailed
        })?;

        let mut written: u64 = 0;
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                tracing::warn!(uri, error = %e, written, "Transfer interrupted");
                FetchErrorKind::TransferFailed
            })?;
            let Some(chunk) = chunk else { break };

            file.write_all(&chunk).await.map_err(|e| {
                tracing::error!(path = %destination.display(), error = %e, "Failed to write segment file");
                FetchErrorKind::TransferFailed
            })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            tracing::error!(path = %destination.display(), error = %e, "Failed to flush segment file");
            FetchErrorKind::TransferFailed
        })?;

        if written == 0 {
            tracing::warn!(uri, "Server returned an empty body");
            return Err(FetchErrorKind::TransferFailed);
        }

        Ok(written)
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str, destination: &Path) -> DownloadOutcome {
        let started = Instant::now();
        tracing::debug!(uri, path = %destination.display(), "Fetching segment");

        match self.try_fetch(uri, destination).await {
            Ok(bytes) => {
                let elapsed = started.elapsed();
                tracing::debug!(uri, bytes, elapsed_ms = elapsed.as_millis() as u64, "Segment fetched");
                DownloadOutcome::succeeded(bytes, elapsed)
            }
            Err(kind) => {
                remove_partial(destination).await;
                DownloadOutcome::failed(kind, started.elapsed())
            }
        }
    }
}

/// Map a reqwest send error onto the failure taxonomy
///
/// With only a connect timeout configured, any timeout at send time is a
/// connect timeout.
fn classify_send_error(e: &reqwest::Error) -> FetchErrorKind {
    if e.is_connect() || e.is_timeout() {
        FetchErrorKind::ConnectFailed
    } else {
        FetchErrorKind::TransferFailed
    }
}
