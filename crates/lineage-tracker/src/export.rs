//! Export document produced by a full extraction pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use lineage_core::types::Usage;
use lineage_core::AgentId;

use crate::agent::AgentSnapshot;
use crate::dedup::{DedupStats, EnrichedEntity};
use crate::tracker::{AgentDag, AgentStatistics};

/// One captured API request with its agent attribution.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: String,
    pub request_index: usize,
    pub sequence: usize,
    pub timestamp: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub model: Option<String>,
    pub message_count: usize,
    pub agent_id: AgentId,
    pub agent_type: String,
    pub is_continuation: bool,
    pub conversation_turn: usize,
    pub spawned_by_task: Option<String>,
    pub parent_agent: Option<AgentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub id: String,
    pub request_index: usize,
    pub timestamp: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: Option<f64>,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
    pub content_block_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemPromptRecord {
    pub hash: String,
    pub text: String,
    pub first_seen_request: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinitionRecord {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub first_seen_request: usize,
}

/// First occurrence of a tool result.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultRecord {
    pub id: String,
    pub tool_use_id: String,
    pub request_index: usize,
    pub is_error: bool,
    pub content: Value,
}

/// An agent id reported by the Task tool in its result text.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalAgent {
    pub id: String,
    pub task_tool_use_id: String,
    pub first_seen_request: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EntityCounts {
    pub api_requests: usize,
    pub api_responses: usize,
    pub tool_definitions: usize,
    pub tool_uses: usize,
    pub tool_results: usize,
    pub tasks: usize,
    pub agents: usize,
    pub system_prompts: usize,
    pub agent_instances: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub counts: EntityCounts,
    pub agent_tracking: AgentStatistics,
    pub deduplication: DedupStats,
    /// Canonical tool uses per tool name.
    pub tool_usage: BTreeMap<String, usize>,
    /// Canonical tasks per requested sub-agent type.
    pub task_types: BTreeMap<String, usize>,
    pub warnings: usize,
}

impl ExtractionSummary {
    /// The `n` most used tools, most used first, ties by name.
    pub fn top_tools(&self, n: usize) -> Vec<(&str, usize)> {
        let mut tools: Vec<(&str, usize)> = self
            .tool_usage
            .iter()
            .map(|(name, &count)| (name.as_str(), count))
            .collect();
        tools.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tools.truncate(n);
        tools
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub extraction_timestamp: DateTime<Utc>,
    pub summary: ExtractionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportEntities {
    pub api_requests: Vec<RequestRecord>,
    pub api_responses: Vec<ResponseRecord>,
    pub tool_definitions: Vec<ToolDefinitionRecord>,
    pub tool_uses: Vec<EnrichedEntity>,
    pub tool_results: Vec<ToolResultRecord>,
    pub tasks: Vec<EnrichedEntity>,
    pub agents: Vec<ExternalAgent>,
    pub system_prompts: Vec<SystemPromptRecord>,
    pub agent_instances: Vec<AgentSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationships {
    pub request_to_response: BTreeMap<usize, usize>,
    pub request_to_agent: BTreeMap<usize, AgentId>,
    pub agent_hierarchy: BTreeMap<AgentId, Vec<AgentId>>,
    pub tool_use_to_result: BTreeMap<String, usize>,
    pub task_to_agent: BTreeMap<String, String>,
}

/// The complete extraction result.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub entities: ExportEntities,
    pub relationships: Relationships,
    pub workflow_dag: AgentDag,
}

impl ExportDocument {
    /// Write as pretty-printed JSON.
    pub fn write_json(&self, path: &std::path::Path) -> lineage_core::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Exported entities");
        Ok(())
    }
}
