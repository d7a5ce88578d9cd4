//! Workflow graph output types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lineage_core::{EdgeKind, WorkflowEdge};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// One request in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Global node index, in chronological order.
    pub id: usize,
    /// Position of the entry in the enriched log list.
    pub log_index: usize,
    pub session_id: usize,
    pub session_local_index: usize,
    pub timestamp: Option<String>,
    pub agent_type: String,
    pub agent_label: String,
    pub model: Option<String>,
    pub duration_ms: Option<f64>,
    pub tokens: TokenCounts,
    pub stop_reason: Option<String>,
    pub has_errors: bool,
    pub tool_count: usize,
    pub subagent_count: usize,
}

/// Placement of one session in the global node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: usize,
    /// First global node index of the session.
    pub node_start: usize,
    /// Last global node index of the session (inclusive).
    pub node_end: usize,
    pub node_count: usize,
    pub edge_count: usize,
    /// Older entries left out because the session exceeded the cap.
    pub dropped_count: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Summary counts computed without traversing the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub session_count: usize,
    pub edges_by_type: BTreeMap<EdgeKind, usize>,
    /// Nodes without incoming edges.
    pub root_count: usize,
    /// Nodes without outgoing edges.
    pub leaf_count: usize,
}

/// The assembled request-level workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<WorkflowEdge>,
    pub sessions: Vec<SessionInfo>,
    pub metrics: GraphMetrics,
}

/// Depth and fan-out measured by traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalMetrics {
    /// Longest chain, counted in nodes, reachable from any root.
    pub max_depth: usize,
    /// Mean out-degree over nodes that have children, to two decimals.
    pub avg_branching_factor: f64,
    pub root_count: usize,
}
