//! lineage-workflow: Request-level workflow graph for captured agent traffic.
//!
//! Orders enriched log entries chronologically, cuts them into sessions at
//! quiet gaps, and runs the edge detectors (tool results, Task spawns,
//! content reuse) inside each session before merging everything into one
//! graph with global node indices.

pub mod config;
pub mod detect;
pub mod enrich;
pub mod graph;
pub mod metrics;
pub mod session;
pub mod types;

pub use config::{AgentTypeLabel, WorkflowConfig};
pub use enrich::{EnrichedLog, LogEnricher, ToolCategory};
pub use types::{GraphMetrics, GraphNode, SessionInfo, TokenCounts, TraversalMetrics, WorkflowGraph};

use std::collections::BTreeMap;

use lineage_core::{LogEntry, WorkflowEdge};

use crate::detect::ToolIndex;
use crate::graph::Adjacency;

/// Builds the workflow graph from enriched entries.
pub struct WorkflowGraphBuilder {
    config: WorkflowConfig,
}

impl WorkflowGraphBuilder {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Enrich raw entries, then build.
    pub fn build_from_entries(&self, entries: Vec<LogEntry>) -> WorkflowGraph {
        let enriched = LogEnricher::new(&self.config).enrich_all(entries);
        self.build(&enriched)
    }

    /// Build the graph. Entries may arrive in any order.
    ///
    /// Sessions are processed independently: every detector sees only the
    /// entries of one session, and edges are shifted to global indices
    /// before merging.
    pub fn build(&self, logs: &[EnrichedLog]) -> WorkflowGraph {
        if logs.is_empty() {
            return WorkflowGraph::default();
        }

        let timestamps: Vec<_> = logs.iter().map(|l| l.entry.parsed_timestamp()).collect();
        let order = session::chronological_order(&timestamps);
        let sorted: Vec<&EnrichedLog> = order.iter().map(|&i| &logs[i]).collect();
        let sorted_timestamps: Vec<_> = order.iter().map(|&i| timestamps[i]).collect();

        let spans = session::detect_sessions(&sorted_timestamps, self.config.session_gap());
        tracing::info!(
            sessions = spans.len(),
            logs = sorted.len(),
            "Detected sessions"
        );

        let mut nodes = Vec::with_capacity(sorted.len());
        let mut edges = Vec::new();
        let mut sessions = Vec::with_capacity(spans.len());

        for (session_id, span) in spans.into_iter().enumerate() {
            let full_len = span.len();
            let span = session::cap_session(span, self.config.max_logs_per_session);
            let dropped_count = full_len - span.len();
            if dropped_count > 0 {
                tracing::info!(
                    session_id,
                    kept = span.len(),
                    dropped = dropped_count,
                    "Capping session at most recent entries"
                );
            }

            let session_logs = &sorted[span];
            let session_edges = self.detect_edges(session_id, session_logs);
            let node_start = nodes.len();

            for (local_idx, log) in session_logs.iter().enumerate() {
                nodes.push(make_node(nodes.len(), session_id, local_idx, log));
            }
            let edge_count = session_edges.len();
            edges.extend(session_edges.into_iter().map(|mut edge| {
                edge.source += node_start;
                edge.target += node_start;
                edge
            }));

            sessions.push(SessionInfo {
                session_id,
                node_start,
                node_end: nodes.len() - 1,
                node_count: session_logs.len(),
                edge_count,
                dropped_count,
                start_time: session_logs.first().and_then(|l| l.entry.timestamp.clone()),
                end_time: session_logs.last().and_then(|l| l.entry.timestamp.clone()),
            });
        }

        let metrics = summary_metrics(nodes.len(), &edges, sessions.len());
        tracing::info!(
            nodes = metrics.total_nodes,
            edges = metrics.total_edges,
            sessions = metrics.session_count,
            "Built workflow graph"
        );

        WorkflowGraph {
            nodes,
            edges,
            sessions,
            metrics,
        }
    }

    fn detect_edges(&self, session_id: usize, logs: &[&EnrichedLog]) -> Vec<WorkflowEdge> {
        let entries: Vec<&LogEntry> = logs.iter().map(|l| &l.entry).collect();

        let index = ToolIndex::build(session_id, &entries);
        let tool_edges = detect::match_tool_results(session_id, &entries, &index);
        let spawn_edges = detect::detect_subagent_spawns(session_id, &entries, &self.config);
        let reuse_edges = detect::detect_content_reuse(session_id, &entries, &self.config);

        tracing::debug!(
            session_id,
            tool_edges = tool_edges.len(),
            spawn_edges = spawn_edges.len(),
            content_reuse_edges = reuse_edges.len(),
            "Detected session edges"
        );

        let mut edges = tool_edges;
        edges.extend(spawn_edges);
        edges.extend(reuse_edges);
        edges
    }
}

impl Default for WorkflowGraphBuilder {
    fn default() -> Self {
        Self::new(WorkflowConfig::default())
    }
}

impl WorkflowGraph {
    pub fn adjacency(&self) -> Adjacency {
        Adjacency::from_edges(self.nodes.len(), &self.edges)
    }

    /// Depth and branching factor. Walks the whole graph.
    pub fn traversal_metrics(&self) -> TraversalMetrics {
        metrics::compute_traversal_metrics(&self.adjacency())
    }
}

fn make_node(id: usize, session_id: usize, session_local_index: usize, log: &EnrichedLog) -> GraphNode {
    let response = log.entry.response.as_ref();
    let tokens = response
        .map(|r| TokenCounts {
            input: r.body.usage.input_tokens,
            output: r.body.usage.output_tokens,
            total: r.body.usage.total(),
        })
        .unwrap_or_default();
    let (agent_type, agent_label) = match &log.agent_type {
        Some(t) => (t.name.clone(), t.label.clone()),
        None => {
            let unknown = AgentTypeLabel::unknown();
            (unknown.name, unknown.label)
        }
    };

    GraphNode {
        id,
        log_index: log.log_index,
        session_id,
        session_local_index,
        timestamp: log.entry.timestamp.clone(),
        agent_type,
        agent_label,
        model: log.model.clone(),
        duration_ms: response.and_then(|r| r.duration_ms),
        tokens,
        stop_reason: log.stop_reason.clone(),
        has_errors: log.has_errors,
        tool_count: log.tool_info.count,
        subagent_count: log.subagent_count,
    }
}

fn summary_metrics(node_count: usize, edges: &[WorkflowEdge], session_count: usize) -> GraphMetrics {
    let mut edges_by_type = BTreeMap::new();
    let mut has_parent = vec![false; node_count];
    let mut has_child = vec![false; node_count];
    for edge in edges {
        *edges_by_type.entry(edge.kind).or_insert(0) += 1;
        has_child[edge.source] = true;
        has_parent[edge.target] = true;
    }

    GraphMetrics {
        total_nodes: node_count,
        total_edges: edges.len(),
        session_count,
        edges_by_type,
        root_count: has_parent.iter().filter(|&&p| !p).count(),
        leaf_count: has_child.iter().filter(|&&c| !c).count(),
    }
}
