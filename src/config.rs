//! Configuration types for segment-dl
//!
//! Read once at startup from a TOML file. Every field has a default, so an
//! empty or missing file yields a working configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "etc/config.toml";

/// Fetch behavior (timeouts, parallelism, request headers)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Connect-phase timeout (default: 10 seconds)
    ///
    /// The only timeout enforced on a fetch. Body transfer is unbounded.
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Upper bound on concurrent workers (default: available parallelism)
    #[serde(default)]
    pub max_parallelism: Option<usize>,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra request headers, name -> value
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            max_parallelism: None,
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
        }
    }
}

impl DownloadConfig {
    /// Resolve the worker cap against the host
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Retry policy configuration
///
/// Failed items are retried on the next run, never within one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Stop re-queuing an item after this many attempts (default: unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// SQLite database file holding the work items (default: "data/segments.db")
    #[serde(default = "default_database_path")]
    pub database: PathBuf,

    /// Directory segment files are written to (default: "files")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Directory for run logs and failure records (default: "logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Fetch settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            database: default_database_path(),
            storage_dir: default_storage_dir(),
            log_dir: default_log_dir(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config {
            message: format!("invalid configuration: {}", e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`
    ///
    /// A missing file is not an error and yields [`Config::default`].
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config {
                message: format!("cannot read {}: {}", path.display(), e),
                key: None,
            }),
        }
    }

    /// Reject values the scheduler and fetcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(Error::config("database", "must not be empty"));
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(Error::config("storage_dir", "must not be empty"));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::config("log_dir", "must not be empty"));
        }
        if self.download.connect_timeout.is_zero() {
            return Err(Error::config(
                "download.connect_timeout",
                "must be at least 1 second",
            ));
        }
        if self.download.max_parallelism == Some(0) {
            return Err(Error::config(
                "download.max_parallelism",
                "must be greater than zero",
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::config(
                "retry.max_attempts",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("segment-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/segments.db")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
