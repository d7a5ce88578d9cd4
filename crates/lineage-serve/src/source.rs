//! The log directory the serving layer reads from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use lineage_core::ingest::{self, IngestReport};

use crate::error::{Result, ServeError};

const EXPORT_PREFIX: &str = "entities_";

/// A directory of `*.jsonl` capture files plus any `entities_*.json`
/// exports written next to them.
#[derive(Debug, Clone)]
pub struct LogSource {
    dir: PathBuf,
}

impl LogSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest modification time of any log file; the cache key.
    pub fn latest_mtime(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(ingest::latest_mtime(&self.dir)?)
    }

    /// Read every log file. Malformed lines are logged and skipped.
    pub fn read_all(&self) -> Result<IngestReport> {
        let report = ingest::read_log_dir(&self.dir)?;
        for warning in &report.warnings {
            tracing::warn!(line = warning.line, reason = %warning.reason, "Skipped malformed log line");
        }
        tracing::info!(
            dir = %self.dir.display(),
            entries = report.entries.len(),
            skipped = report.warnings.len(),
            "Read logs"
        );
        Ok(report)
    }

    /// Most recently modified `entities_*.json` file, if any.
    pub fn latest_export(&self) -> Result<Option<PathBuf>> {
        if !self.dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_export = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(EXPORT_PREFIX) && n.ends_with(".json"));
            if !is_export {
                continue;
            }
            let modified = std::fs::metadata(&path)?.modified()?;
            if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
                latest = Some((modified, path));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }

    /// Parse the most recent export.
    pub fn load_latest_export(&self) -> Result<Value> {
        let path = self
            .latest_export()?
            .ok_or_else(|| ServeError::ExportNotFound {
                dir: self.dir.display().to_string(),
            })?;
        let bytes = std::fs::read(&path)?;
        tracing::info!(path = %path.display(), "Loaded entities export");
        Ok(serde_json::from_slice(&bytes)?)
    }
}
