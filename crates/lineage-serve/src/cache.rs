//! Durable cache tier: one JSON file holding the last built payload and
//! the source modification time it was built from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize)]
struct CacheRecordRef<'a, T> {
    last_modified: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Deserialize)]
struct CacheRecord<T> {
    last_modified: DateTime<Utc>,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    path: PathBuf,
}

impl DiskCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached payload if it was built from sources at least as new
    /// as `key`. A missing or unreadable file is a miss, not an error.
    pub async fn load<T: DeserializeOwned>(&self, key: DateTime<Utc>) -> Option<T> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read cache");
                return None;
            }
        };
        let record: CacheRecord<T> = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding corrupt cache");
                return None;
            }
        };
        if record.last_modified < key {
            tracing::debug!(path = %self.path.display(), "Disk cache is stale");
            return None;
        }
        Some(record.payload)
    }

    /// Write the payload, replacing the file atomically.
    pub async fn store<T: Serialize>(&self, key: DateTime<Utc>, payload: &T) -> Result<()> {
        let record = CacheRecordRef {
            last_modified: key,
            payload,
        };
        let bytes = serde_json::to_vec(&record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::info!(path = %self.path.display(), "Saved cache to disk");
        Ok(())
    }

    pub async fn invalidate(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_store_then_load_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));
        cache.store(at(10), &vec!["a".to_string()]).await.unwrap();

        let same: Option<Vec<String>> = cache.load(at(10)).await;
        assert_eq!(same, Some(vec!["a".to_string()]));
        let older: Option<Vec<String>> = cache.load(at(9)).await;
        assert!(older.is_some());
        let newer: Option<Vec<String>> = cache.load(at(11)).await;
        assert!(newer.is_none());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));
        assert!(cache.load::<Vec<String>>(at(10)).await.is_none());

        std::fs::write(cache.path(), b"{not json").unwrap();
        assert!(cache.load::<Vec<String>>(at(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));
        cache.invalidate().await.unwrap();

        cache.store(at(10), &1u32).await.unwrap();
        cache.invalidate().await.unwrap();
        assert!(!cache.path().exists());
    }
}
