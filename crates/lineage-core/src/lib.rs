//! lineage-core: Shared types, ingestion, configuration, and error handling for
//! agent-lineage reconstruction.
//!
//! This crate provides the foundational types used across all lineage components:
//! - The captured request/response log model (`LogEntry`, `Message`, `ContentBlock`)
//! - Typed workflow edges (`EdgeKind`, `AgentEdge`, `WorkflowEdge`)
//! - JSONL ingestion with skip-and-warn handling of malformed lines
//! - Layered configuration loading
//! - Common error types

pub mod config;
pub mod edges;
pub mod error;
pub mod ingest;
pub mod types;

pub use edges::{AgentEdge, AgentId, EdgeKind, WorkflowEdge};
pub use error::{LineageError, Result};
pub use types::{
    parse_timestamp, ContentBlock, LogEntry, Message, MessageContent, RequestBody, ResponseBody,
};
