//! Common test utilities for segment-dl integration tests

#![allow(dead_code)]

use segment_dl::Config;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config rooted in a temporary directory
pub fn test_config(root: &Path) -> Config {
    let mut config = Config {
        database: root.join("data/segments.db"),
        storage_dir: root.join("files"),
        log_dir: root.join("logs"),
        ..Default::default()
    };
    config.download.max_parallelism = Some(4);
    config
}

/// Temporary workspace plus its config
pub fn workspace() -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    (dir, config)
}

/// Serve `body` at `/live/<name>`
pub async fn mount_segment(server: &MockServer, name: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/live/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Answer `/live/<name>` with `status`
pub async fn mount_status(server: &MockServer, name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/live/{name}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Minimal HLS media playlist pointing at `names` on `server`
pub fn playlist(server: &MockServer, names: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
    for name in names {
        text.push_str("#EXTINF:6.000,\n");
        text.push_str(&format!("{}/live/{name}\n", server.uri()));
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}
