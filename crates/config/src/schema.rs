//! Config schema types.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutsConfig,
    pub storage: StorageConfig,
    pub actions: ActionsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA zone used to interpret cron expressions. UTC when unset.
    pub timezone: Option<String>,
    /// Number of handlers allowed to execute concurrently.
    pub workers: usize,
    pub idle_poll_secs: u64,
    /// How long `run` waits for in-flight handlers on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            workers: 4,
            idle_poll_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Retry-with-backoff settings. Attempt `n` waits `base * 2^n`, capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 300_000,
        }
    }
}

impl RetryConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Execution timeouts, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Applies to every action without an explicit entry. Unbounded when unset.
    pub default_secs: Option<u64>,
    /// Per-action overrides keyed by action id.
    pub actions: HashMap<String, u64>,
}

impl TimeoutsConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_secs.map(Duration::from_secs)
    }

    /// Overrides with lowercased keys.
    pub fn action_timeouts(&self) -> HashMap<String, Duration> {
        self.actions
            .iter()
            .map(|(action, secs)| (action.trim().to_ascii_lowercase(), Duration::from_secs(*secs)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    File,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file (sqlite) or directory (file). Defaults under the data
    /// directory.
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Where the backend keeps its data, given the resolved data directory.
    pub fn resolve_path(&self, data_dir: &Path) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, StorageBackend::File) => data_dir.join("jobs"),
            (None, _) => data_dir.join("cadence.db"),
        }
    }
}

/// Settings for the built-in action handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Request timeout for `call_api`.
    pub http_timeout_secs: u64,
    pub user_agent: String,
    /// Base directory for relative `write_file` paths.
    pub write_file_dir: Option<PathBuf>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            user_agent: concat!("cadence/", env!("CARGO_PKG_VERSION")).to_string(),
            write_file_dir: None,
        }
    }
}

impl ActionsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
