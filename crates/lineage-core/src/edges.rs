//! Edge types shared by the agent-level and request-level graphs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a reconstructed agent instance (`agent_0`, `agent_1`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Ids are assigned from a monotonic counter in creation order.
    pub fn from_counter(n: usize) -> Self {
        Self(format!("agent_{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How one request or agent feeds another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// A tool call's result comes back in a later request.
    ToolResult,
    /// A Task-tool call or shell command spawned a child agent.
    SubagentSpawn,
    /// Response text of one request reappears as input of another agent.
    ContentReuse,
    /// Consecutive requests of one agent.
    RequestSequence,
}

impl EdgeKind {
    /// Fixed confidence attached to every edge of this kind.
    pub fn confidence(self) -> f64 {
        match self {
            Self::ToolResult => 1.0,
            Self::SubagentSpawn => 0.95,
            Self::ContentReuse => 0.85,
            Self::RequestSequence => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolResult => "tool_result",
            Self::SubagentSpawn => "subagent_spawn",
            Self::ContentReuse => "content_reuse",
            Self::RequestSequence => "request_sequence",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two agent instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEdge {
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub source: AgentId,
    pub target: AgentId,
    #[serde(default)]
    pub source_request: Option<usize>,
    #[serde(default)]
    pub target_request: Option<usize>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AgentEdge {
    pub fn new(kind: EdgeKind, source: AgentId, target: AgentId) -> Self {
        Self {
            kind,
            source,
            target,
            source_request: None,
            target_request: None,
            confidence: kind.confidence(),
            metadata: Value::Null,
        }
    }

    pub fn between_requests(mut self, source_request: usize, target_request: usize) -> Self {
        self.source_request = Some(source_request);
        self.target_request = Some(target_request);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Directed edge between two request nodes of the workflow graph.
///
/// `source` and `target` are global node indices; `source < target` holds
/// for every edge the builder emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEdge {
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub source: usize,
    pub target: usize,
    pub session_id: usize,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl WorkflowEdge {
    pub fn new(kind: EdgeKind, source: usize, target: usize, session_id: usize) -> Self {
        Self {
            kind,
            source,
            target,
            session_id,
            confidence: kind.confidence(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
