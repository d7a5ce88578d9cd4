//! lineage-serve: Cached, single-flight access to lineage results.
//!
//! Reads captured logs from a directory, rebuilds enriched logs and the
//! workflow graph on demand behind a memory and disk cache keyed by the
//! newest log modification time, and never runs two builds of the same
//! payload at once.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod source;

pub use config::ServeConfig;
pub use coordinator::{BuildCoordinator, CacheTier, Fetched};
pub use error::{Result, ServeError};
pub use service::{LineageService, WorkflowPayload};
pub use source::LogSource;
