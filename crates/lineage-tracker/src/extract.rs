//! Single-pass entity extraction over a captured log.
//!
//! Drives the tracker and deduplicator in the order their indexes depend
//! on each other: identify the agent first, then registries, then request
//! blocks, then content-reuse matching, then response blocks, and only
//! then register the response text for later requests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use lineage_core::ingest::read_log_file;
use lineage_core::types::{ContentBlock, LogEntry};
use lineage_core::AgentId;
use lineage_fingerprint::system_prompt_hash;

use crate::config::TrackerConfig;
use crate::dedup::{EnrichedEntity, EntityDeduplicator};
use crate::export::{
    EntityCounts, ExportDocument, ExportEntities, ExportMetadata, ExternalAgent,
    ExtractionSummary, Relationships, RequestRecord, ResponseRecord, SystemPromptRecord,
    ToolDefinitionRecord, ToolResultRecord,
};
use crate::tracker::AgentLineageTracker;

static RE_AGENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"agentId:\s*([a-f0-9]+)").expect("agent id regex is valid"));

/// Per-request context shared by every block of one entry.
struct RequestContext<'a> {
    request_index: usize,
    agent_id: AgentId,
    timestamp: Option<&'a str>,
}

pub struct EntityExtractor {
    tracker: AgentLineageTracker,
    dedup: EntityDeduplicator,
    requests: Vec<RequestRecord>,
    responses: Vec<ResponseRecord>,
    system_prompts: Vec<SystemPromptRecord>,
    system_prompt_hashes: HashSet<String>,
    tool_definitions: BTreeMap<String, ToolDefinitionRecord>,
    tool_uses: Vec<EnrichedEntity>,
    tool_results: Vec<ToolResultRecord>,
    tasks: Vec<EnrichedEntity>,
    external_agents: BTreeMap<String, ExternalAgent>,
    request_to_response: BTreeMap<usize, usize>,
    tool_use_to_result: BTreeMap<String, usize>,
    task_to_agent: BTreeMap<String, String>,
    warnings: usize,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl EntityExtractor {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracker: AgentLineageTracker::new(config),
            dedup: EntityDeduplicator::new(),
            requests: Vec::new(),
            responses: Vec::new(),
            system_prompts: Vec::new(),
            system_prompt_hashes: HashSet::new(),
            tool_definitions: BTreeMap::new(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
            tasks: Vec::new(),
            external_agents: BTreeMap::new(),
            request_to_response: BTreeMap::new(),
            tool_use_to_result: BTreeMap::new(),
            task_to_agent: BTreeMap::new(),
            warnings: 0,
        }
    }

    pub fn tracker(&self) -> &AgentLineageTracker {
        &self.tracker
    }

    pub fn deduplicator(&self) -> &EntityDeduplicator {
        &self.dedup
    }

    /// Read and process every entry of a JSONL log file.
    pub fn extract_from_file(&mut self, path: &Path) -> lineage_core::Result<()> {
        let report = read_log_file(path)?;
        self.warnings += report.warnings.len();
        tracing::info!(
            path = %path.display(),
            entries = report.entries.len(),
            skipped = report.warnings.len(),
            "Extracting entities"
        );
        self.process_entries(&report.entries);
        Ok(())
    }

    pub fn process_entries(&mut self, entries: &[LogEntry]) {
        for entry in entries {
            self.process_entry(entry);
        }
    }

    /// Process one entry. Request indices are assigned in call order.
    pub fn process_entry(&mut self, entry: &LogEntry) {
        let request_index = self.requests.len();
        let timestamp = entry.timestamp.as_deref();
        let body = &entry.body;

        let agent = self
            .tracker
            .identify_or_create_agent(request_index, body, timestamp);
        let ctx = RequestContext {
            request_index,
            agent_id: agent.agent_id.clone(),
            timestamp,
        };
        self.requests.push(RequestRecord {
            id: format!("req_{request_index}"),
            request_index,
            sequence: entry.sequence,
            timestamp: entry.timestamp.clone(),
            method: entry.method.clone(),
            path: entry.path.clone(),
            url: entry.url.clone(),
            headers: entry.headers.clone(),
            model: body.model.clone(),
            message_count: body.messages.len(),
            agent_id: agent.agent_id.clone(),
            agent_type: agent.system_prompt_hash.clone(),
            is_continuation: agent.requests.len() > 1,
            conversation_turn: agent.message_count_history.len(),
            spawned_by_task: agent.spawn.as_ref().map(|s| s.tool_use_id.clone()),
            parent_agent: agent.parent_agent_id().cloned(),
        });

        self.register_system_prompt(entry, request_index);
        self.register_tool_definitions(entry, request_index);

        for message in &body.messages {
            for block in message.blocks().iter() {
                self.process_block(block, &ctx);
            }
        }
        self.tracker
            .track_request_content(request_index, &body.messages);

        if let Some(response) = &entry.response {
            self.request_to_response
                .insert(request_index, self.responses.len());
            self.responses.push(ResponseRecord {
                id: format!("resp_{}", self.responses.len()),
                request_index,
                timestamp: response.timestamp.clone().or_else(|| entry.timestamp.clone()),
                status: response.status,
                duration_ms: response.duration_ms,
                model: response.body.model.clone(),
                stop_reason: response.body.stop_reason.clone(),
                usage: response.body.usage.clone(),
                content_block_count: response.body.content.len(),
            });

            for block in &response.body.content {
                self.process_block(block, &ctx);
            }
            self.tracker
                .track_response_content(request_index, &response.body.content);
        }
    }

    fn register_system_prompt(&mut self, entry: &LogEntry, request_index: usize) {
        if entry.body.system.is_empty() {
            return;
        }
        let hash = system_prompt_hash(&entry.body.system);
        if self.system_prompt_hashes.insert(hash.clone()) {
            self.system_prompts.push(SystemPromptRecord {
                hash,
                text: entry.body.system.texts().collect::<Vec<_>>().join("|||"),
                first_seen_request: request_index,
            });
        }
    }

    fn register_tool_definitions(&mut self, entry: &LogEntry, request_index: usize) {
        for tool in &entry.body.tools {
            let Some(name) = tool.name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            self.tool_definitions
                .entry(name.to_string())
                .or_insert_with(|| ToolDefinitionRecord {
                    name: name.to_string(),
                    description: tool.description.clone().unwrap_or_default(),
                    input_schema: tool.input_schema.clone(),
                    first_seen_request: request_index,
                });
        }
    }

    fn process_block(&mut self, block: &ContentBlock, ctx: &RequestContext<'_>) {
        match block {
            ContentBlock::ToolUse { id, name, input } => {
                let entity = self.dedup.record_occurrence(
                    json!({ "id": id, "tool_name": name, "input": input }),
                    id.as_deref(),
                    "tool_use",
                    ctx.request_index,
                    Some(&ctx.agent_id),
                );
                if !entity.is_duplicate {
                    self.tool_uses.push(entity);
                }
                self.tracker
                    .track_tool_use(ctx.request_index, block, ctx.timestamp);

                if self.tracker.config().is_task_tool(name) {
                    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or_default();
                    let task = self.dedup.record_occurrence(
                        json!({
                            "id": id,
                            "tool_use_id": id,
                            "description": field("description"),
                            "prompt": field("prompt"),
                            "subagent_type": field("subagent_type"),
                        }),
                        id.as_deref(),
                        "task",
                        ctx.request_index,
                        Some(&ctx.agent_id),
                    );
                    if !task.is_duplicate {
                        self.tasks.push(task);
                    }
                }
            }
            ContentBlock::ToolResult {
                tool_use_id: Some(tool_use_id),
                content,
                is_error,
            } => {
                self.tracker
                    .track_tool_result(ctx.request_index, block, ctx.timestamp);
                if self.tool_use_to_result.contains_key(tool_use_id) {
                    return;
                }
                self.tool_use_to_result
                    .insert(tool_use_id.clone(), self.tool_results.len());
                self.tool_results.push(ToolResultRecord {
                    id: format!("result_{}", self.tool_results.len()),
                    tool_use_id: tool_use_id.clone(),
                    request_index: ctx.request_index,
                    is_error: *is_error,
                    content: content.clone(),
                });

                if let Some(agent_id) = external_agent_id(content) {
                    self.task_to_agent
                        .insert(tool_use_id.clone(), agent_id.clone());
                    self.external_agents
                        .entry(agent_id.clone())
                        .or_insert_with(|| ExternalAgent {
                            id: agent_id,
                            task_tool_use_id: tool_use_id.clone(),
                            first_seen_request: ctx.request_index,
                        });
                }
            }
            _ => {}
        }
    }

    pub fn summary(&self) -> ExtractionSummary {
        let mut tool_usage = BTreeMap::new();
        for tool_use in &self.tool_uses {
            let name = tool_use
                .payload
                .get("tool_name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .unwrap_or("unknown");
            *tool_usage.entry(name.to_string()).or_insert(0) += 1;
        }

        let mut task_types = BTreeMap::new();
        for task in &self.tasks {
            let subagent_type = task
                .payload
                .get("subagent_type")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .unwrap_or("unknown");
            *task_types.entry(subagent_type.to_string()).or_insert(0) += 1;
        }

        ExtractionSummary {
            counts: EntityCounts {
                api_requests: self.requests.len(),
                api_responses: self.responses.len(),
                tool_definitions: self.tool_definitions.len(),
                tool_uses: self.tool_uses.len(),
                tool_results: self.tool_results.len(),
                tasks: self.tasks.len(),
                agents: self.external_agents.len(),
                system_prompts: self.system_prompts.len(),
                agent_instances: self.tracker.agents().len(),
            },
            agent_tracking: self.tracker.statistics(),
            deduplication: self.dedup.stats(),
            tool_usage,
            task_types,
            warnings: self.warnings,
        }
    }

    /// Assemble the export document from everything processed so far.
    pub fn export(&self) -> ExportDocument {
        ExportDocument {
            metadata: ExportMetadata {
                extraction_timestamp: chrono::Utc::now(),
                summary: self.summary(),
            },
            entities: ExportEntities {
                api_requests: self.requests.clone(),
                api_responses: self.responses.clone(),
                tool_definitions: self.tool_definitions.values().cloned().collect(),
                tool_uses: self.tool_uses.clone(),
                tool_results: self.tool_results.clone(),
                tasks: self.tasks.clone(),
                agents: self.external_agents.values().cloned().collect(),
                system_prompts: self.system_prompts.clone(),
                agent_instances: self.tracker.export_instances(),
            },
            relationships: Relationships {
                request_to_response: self.request_to_response.clone(),
                request_to_agent: self.tracker.request_to_agent(),
                agent_hierarchy: self.tracker.agent_hierarchy(),
                tool_use_to_result: self.tool_use_to_result.clone(),
                task_to_agent: self.task_to_agent.clone(),
            },
            workflow_dag: self.tracker.build_workflow_dag(),
        }
    }
}

/// Agent id the Task tool reports in its result text (`agentId: <hex>`).
fn external_agent_id(content: &Value) -> Option<String> {
    let texts: Vec<&str> = match content {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect(),
        _ => Vec::new(),
    };
    texts
        .into_iter()
        .find_map(|text| RE_AGENT_ID.captures(text))
        .map(|caps| caps[1].to_string())
}
