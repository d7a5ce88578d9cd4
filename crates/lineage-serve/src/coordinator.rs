//! Single-flight rebuilds behind a two-tier cache.
//!
//! A payload is an expensive, idempotent function of the log directory,
//! keyed by the newest log modification time. At most one build runs per
//! coordinator. Callers arriving while it runs subscribe to its outcome on
//! a watch channel and wait up to the configured timeout. The build itself
//! runs on a detached task, so a caller that times out or goes away never
//! leaves the slot stuck.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::cache::DiskCache;
use crate::error::{Result, ServeError};

/// Newest source modification time, or `None` when there are no sources.
/// An absent key never matches a cached payload.
pub type CacheKey = Option<DateTime<Utc>>;

/// Where a returned payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Disk,
    Built,
}

impl CacheTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Built => "built",
        }
    }
}

impl Serialize for CacheTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Fetched<T> {
    pub value: Arc<T>,
    pub tier: CacheTier,
}

/// `None` until the build finishes.
type Outcome<T> = Option<std::result::Result<Arc<T>, String>>;

struct Slot<T> {
    memory: Option<(DateTime<Utc>, Arc<T>)>,
    building: Option<watch::Receiver<Outcome<T>>>,
}

impl<T> Slot<T> {
    fn fresh(&self, key: CacheKey) -> Option<Arc<T>> {
        let key = key?;
        match &self.memory {
            Some((built_from, value)) if *built_from >= key => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

struct Inner<T> {
    name: String,
    timeout: Duration,
    disk: Option<DiskCache>,
    slot: Mutex<Slot<T>>,
}

pub struct BuildCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BuildCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BuildCoordinator<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Memory-only coordinator.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self::with_disk(name, timeout, None)
    }

    /// Coordinator with an optional durable tier.
    pub fn with_disk(name: impl Into<String>, timeout: Duration, disk: Option<DiskCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                timeout,
                disk,
                slot: Mutex::new(Slot {
                    memory: None,
                    building: None,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub async fn is_building(&self) -> bool {
        self.inner.slot.lock().await.building.is_some()
    }

    /// Return the payload for `key`, building it if no tier holds one at
    /// least as fresh.
    ///
    /// `build` runs on the blocking pool only when this call starts the
    /// build; otherwise it is dropped and the caller waits on the build in
    /// flight. A failed or timed-out wait returns a retryable error.
    pub async fn get_or_build<F>(&self, key: CacheKey, build: F) -> Result<Fetched<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let mut rx = {
            let mut slot = self.inner.slot.lock().await;
            if let Some(value) = slot.fresh(key) {
                tracing::info!(cache = %self.inner.name, tier = "memory", "Cache hit");
                return Ok(Fetched {
                    value,
                    tier: CacheTier::Memory,
                });
            }

            // A closed sender means the build task died without publishing;
            // start a new one instead of waiting on it.
            let in_flight = slot
                .building
                .as_ref()
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();

            if let Some(rx) = in_flight {
                tracing::info!(cache = %self.inner.name, "Build in progress, waiting");
                rx
            } else {
                if let (Some(key), Some(disk)) = (key, &self.inner.disk) {
                    if let Some(payload) = disk.load::<T>(key).await {
                        let value = Arc::new(payload);
                        slot.memory = Some((key, Arc::clone(&value)));
                        tracing::info!(cache = %self.inner.name, tier = "disk", "Cache hit");
                        return Ok(Fetched {
                            value,
                            tier: CacheTier::Disk,
                        });
                    }
                }

                let (tx, rx) = watch::channel(None);
                slot.building = Some(rx.clone());
                self.spawn_build(key, build, tx);
                rx
            }
        };

        let outcome = match tokio::time::timeout(self.inner.timeout, rx.wait_for(Option::is_some)).await
        {
            Err(_) => {
                tracing::error!(cache = %self.inner.name, "Timed out waiting for build");
                return Err(ServeError::Timeout {
                    name: self.inner.name.clone(),
                    waited_secs: self.inner.timeout.as_secs(),
                });
            }
            Ok(Err(_)) => None,
            Ok(Ok(outcome)) => outcome.clone(),
        };

        match outcome {
            Some(Ok(value)) => Ok(Fetched {
                value,
                tier: CacheTier::Built,
            }),
            Some(Err(reason)) => Err(ServeError::BuildFailed {
                name: self.inner.name.clone(),
                reason,
            }),
            None => Err(ServeError::BuildFailed {
                name: self.inner.name.clone(),
                reason: "build ended without a result".to_string(),
            }),
        }
    }

    fn spawn_build<F>(&self, key: CacheKey, build: F, tx: watch::Sender<Outcome<T>>)
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let build_id = Uuid::new_v4();

        tokio::spawn(async move {
            let started = Instant::now();
            tracing::info!(cache = %inner.name, %build_id, "Build started");

            let result = match tokio::task::spawn_blocking(build).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("build task panicked: {e}")),
            };

            let mut slot = inner.slot.lock().await;
            slot.building = None;
            let outcome = match result {
                Ok(value) => {
                    let value = Arc::new(value);
                    if let Some(key) = key {
                        slot.memory = Some((key, Arc::clone(&value)));
                        if let Some(disk) = &inner.disk {
                            if let Err(e) = disk.store(key, value.as_ref()).await {
                                tracing::warn!(cache = %inner.name, error = %e, "Failed to save cache");
                            }
                        }
                    }
                    tracing::info!(
                        cache = %inner.name,
                        %build_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Build complete"
                    );
                    Ok(value)
                }
                Err(reason) => {
                    slot.memory = None;
                    if let Some(disk) = &inner.disk {
                        if let Err(e) = disk.invalidate().await {
                            tracing::warn!(cache = %inner.name, error = %e, "Failed to invalidate cache");
                        }
                    }
                    tracing::error!(cache = %inner.name, %build_id, %reason, "Build failed");
                    Err(reason)
                }
            };
            drop(slot);
            tx.send_replace(Some(outcome));
        });
    }
}
