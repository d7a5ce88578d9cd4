//! Lineage Tracker: agent identity and entity reconstruction.
//!
//! Requests are consumed one at a time in log order. The tracker decides
//! which logical agent issued each request (replay, continuation, or a new
//! agent possibly spawned by a parent), the deduplicator collapses entities
//! repeated by history replay, and the extractor drives both and produces
//! the export document.

pub mod agent;
pub mod command;
pub mod config;
pub mod dedup;
pub mod export;
pub mod extract;
pub mod tracker;

pub use agent::{AgentInstance, AgentSnapshot, AgentTree, SpawnMethod, SpawnOrigin};
pub use config::TrackerConfig;
pub use dedup::{DedupStats, EnrichedEntity, EntityDeduplicator, UniqueEntity};
pub use export::{ExportDocument, ExtractionSummary};
pub use extract::EntityExtractor;
pub use tracker::{AgentDag, AgentLineageTracker, AgentStatistics};
