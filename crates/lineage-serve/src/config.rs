//! Configuration for the lineage serving layer.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Serving configuration.
///
/// Loaded from `lineage.toml` `[serve]` section or
/// `LINEAGE_SERVE__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    /// Directory holding the captured `*.jsonl` logs (default: "./logs").
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Durable workflow cache. Defaults to `.workflow_cache.json` inside
    /// the log directory.
    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    /// How long a caller waits on an in-flight build (default: 60s).
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl ServeConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| self.log_dir.join(".workflow_cache.json"))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_build_timeout_secs() -> u64 {
    60
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            cache_file: None,
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}
