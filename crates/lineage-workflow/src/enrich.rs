//! Per-entry log enrichment.
//!
//! Annotates each captured entry with what a reader of the log list wants
//! at a glance: which kind of agent sent it, which tools the response
//! called, whether it spawned sub-agents, and whether any tool failed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lineage_core::types::ContentBlock;
use lineage_core::LogEntry;
use lineage_fingerprint::system_prompt_hash;

use crate::config::{AgentTypeLabel, WorkflowConfig};

/// Width of the system prompt hash prefix used to look up agent types.
pub const AGENT_TYPE_PREFIX_LEN: usize = 8;

const SPAWN_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Read,
    Write,
    Execute,
    Orchestration,
    Interaction,
    Other,
}

impl ToolCategory {
    pub fn of(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "Glob" | "Grep" | "LSP" => Self::Read,
            "Edit" | "Write" => Self::Write,
            "Bash" | "KillShell" => Self::Execute,
            "Task" | "TodoWrite" | "EnterPlanMode" | "ExitPlanMode" => Self::Orchestration,
            "AskUserQuestion" => Self::Interaction,
            _ => Self::Other,
        }
    }
}

/// A tool call made in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub count: usize,
    pub tools: Vec<ToolCall>,
    pub tool_counts: BTreeMap<String, usize>,
    pub categories: BTreeMap<ToolCategory, usize>,
    pub has_tools: bool,
}

/// Summary of one Task call in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnSummary {
    pub subagent_type: Option<String>,
    pub model: Option<String>,
    pub description: String,
    pub has_resume: bool,
}

/// A log entry with its classification fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedLog {
    #[serde(flatten)]
    pub entry: LogEntry,
    /// Position in the list handed to the enricher.
    pub log_index: usize,
    /// `None` when the request carries no system prompt.
    pub agent_type: Option<AgentTypeLabel>,
    pub tool_info: ToolInfo,
    pub subagent_spawns: Vec<SpawnSummary>,
    pub has_subagent_spawns: bool,
    pub subagent_count: usize,
    /// Errored tool results in the request history.
    pub tool_errors: usize,
    pub has_errors: bool,
    pub stop_reason: Option<String>,
    /// Response model, falling back to the requested model.
    pub model: Option<String>,
}

impl EnrichedLog {
    pub fn agent_type_name(&self) -> &str {
        self.agent_type.as_ref().map_or("unknown", |t| t.name.as_str())
    }
}

/// Classifies entries against the configured agent type table.
#[derive(Debug, Clone)]
pub struct LogEnricher<'a> {
    config: &'a WorkflowConfig,
}

impl<'a> LogEnricher<'a> {
    pub fn new(config: &'a WorkflowConfig) -> Self {
        Self { config }
    }

    /// Enrich every entry, tagging each with its position.
    pub fn enrich_all(&self, entries: Vec<LogEntry>) -> Vec<EnrichedLog> {
        let enriched: Vec<EnrichedLog> = entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| self.enrich(entry, idx))
            .collect();
        tracing::debug!(entries = enriched.len(), "Enriched log entries");
        enriched
    }

    pub fn enrich(&self, entry: LogEntry, log_index: usize) -> EnrichedLog {
        let agent_type = self.classify_agent_type(&entry);
        let tools = response_tools(&entry);
        let tool_info = tool_info(tools);
        let subagent_spawns = spawn_summaries(&tool_info.tools, &self.config.task_tool_name);
        let tool_errors = count_tool_errors(&entry);
        let stop_reason = entry.stop_reason().map(String::from);
        let model = entry
            .response
            .as_ref()
            .and_then(|r| r.body.model.clone())
            .or_else(|| entry.body.model.clone());

        EnrichedLog {
            log_index,
            agent_type,
            has_subagent_spawns: !subagent_spawns.is_empty(),
            subagent_count: subagent_spawns.len(),
            subagent_spawns,
            tool_info,
            has_errors: tool_errors > 0,
            tool_errors,
            stop_reason,
            model,
            entry,
        }
    }

    fn classify_agent_type(&self, entry: &LogEntry) -> Option<AgentTypeLabel> {
        if entry.body.system.is_empty() {
            return None;
        }
        let hash = system_prompt_hash(&entry.body.system);
        let prefix = &hash[..AGENT_TYPE_PREFIX_LEN.min(hash.len())];
        Some(
            self.config
                .agent_types
                .get(prefix)
                .cloned()
                .unwrap_or_else(AgentTypeLabel::unknown),
        )
    }
}

fn response_tools(entry: &LogEntry) -> Vec<ToolCall> {
    entry
        .response_blocks()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn tool_info(tools: Vec<ToolCall>) -> ToolInfo {
    let mut tool_counts = BTreeMap::new();
    let mut categories = BTreeMap::new();
    for tool in tools.iter().filter(|t| !t.name.is_empty()) {
        *tool_counts.entry(tool.name.clone()).or_insert(0) += 1;
        *categories.entry(ToolCategory::of(&tool.name)).or_insert(0) += 1;
    }
    ToolInfo {
        count: tools.len(),
        has_tools: !tools.is_empty(),
        tools,
        tool_counts,
        categories,
    }
}

fn spawn_summaries(tools: &[ToolCall], task_tool_name: &str) -> Vec<SpawnSummary> {
    let str_field = |input: &Value, key: &str| input.get(key).and_then(Value::as_str).map(String::from);

    tools
        .iter()
        .filter(|t| t.name == task_tool_name)
        .map(|t| SpawnSummary {
            subagent_type: str_field(&t.input, "subagent_type"),
            model: str_field(&t.input, "model"),
            description: str_field(&t.input, "description")
                .unwrap_or_default()
                .chars()
                .take(SPAWN_DESCRIPTION_CHARS)
                .collect(),
            has_resume: t.input.get("resume").is_some(),
        })
        .collect()
}

fn count_tool_errors(entry: &LogEntry) -> usize {
    entry
        .body
        .messages
        .iter()
        .flat_map(|msg| msg.blocks().into_owned())
        .filter(|block| matches!(block, ContentBlock::ToolResult { is_error: true, .. }))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::types::{RequestBody, ResponseBody, ResponseEnvelope, SystemPrompt};
    use lineage_core::Message;
    use serde_json::json;

    fn entry_with_response(blocks: Vec<ContentBlock>) -> LogEntry {
        LogEntry {
            body: RequestBody {
                model: Some("claude-sonnet".to_string()),
                system: SystemPrompt {
                    blocks: vec!["You are a file search specialist".to_string()],
                },
                messages: vec![Message::user("find the config loader")],
                ..Default::default()
            },
            response: Some(ResponseEnvelope {
                body: ResponseBody {
                    content: blocks,
                    stop_reason: Some("tool_use".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_tool_categories() {
        assert_eq!(ToolCategory::of("Grep"), ToolCategory::Read);
        assert_eq!(ToolCategory::of("Write"), ToolCategory::Write);
        assert_eq!(ToolCategory::of("KillShell"), ToolCategory::Execute);
        assert_eq!(ToolCategory::of("TodoWrite"), ToolCategory::Orchestration);
        assert_eq!(ToolCategory::of("AskUserQuestion"), ToolCategory::Interaction);
        assert_eq!(ToolCategory::of("WebFetch"), ToolCategory::Other);
    }

    #[test]
    fn test_tool_info_counts() {
        let entry = entry_with_response(vec![
            ContentBlock::text("Looking around"),
            ContentBlock::tool_use("t1", "Read", json!({"file_path": "a.rs"})),
            ContentBlock::tool_use("t2", "Read", json!({"file_path": "b.rs"})),
            ContentBlock::tool_use("t3", "Bash", json!({"command": "ls"})),
        ]);
        let config = WorkflowConfig::default();
        let enriched = LogEnricher::new(&config).enrich(entry, 4);

        assert_eq!(enriched.log_index, 4);
        assert_eq!(enriched.tool_info.count, 3);
        assert_eq!(enriched.tool_info.tool_counts["Read"], 2);
        assert_eq!(enriched.tool_info.categories[&ToolCategory::Read], 2);
        assert_eq!(enriched.tool_info.categories[&ToolCategory::Execute], 1);
        assert_eq!(enriched.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(enriched.model.as_deref(), Some("claude-sonnet"));
        assert!(!enriched.has_subagent_spawns);
    }

    #[test]
    fn test_spawn_summary() {
        let long_description = "d".repeat(150);
        let entry = entry_with_response(vec![ContentBlock::tool_use(
            "task1",
            "Task",
            json!({
                "subagent_type": "Explore",
                "description": long_description,
                "prompt": "Find the loader",
                "resume": "agent-7"
            }),
        )]);
        let config = WorkflowConfig::default();
        let enriched = LogEnricher::new(&config).enrich(entry, 0);

        assert_eq!(enriched.subagent_count, 1);
        let spawn = &enriched.subagent_spawns[0];
        assert_eq!(spawn.subagent_type.as_deref(), Some("Explore"));
        assert_eq!(spawn.description.len(), 100);
        assert!(spawn.has_resume);
        assert_eq!(spawn.model, None);
    }

    #[test]
    fn test_agent_type_lookup() {
        let entry = entry_with_response(Vec::new());
        let prefix = system_prompt_hash(&entry.body.system)[..AGENT_TYPE_PREFIX_LEN].to_string();

        let mut config = WorkflowConfig::default();
        let enriched = LogEnricher::new(&config).enrich(entry.clone(), 0);
        assert_eq!(enriched.agent_type_name(), "unknown");

        config.agent_types.insert(
            prefix,
            AgentTypeLabel {
                name: "file_search".to_string(),
                label: "File Search Specialist".to_string(),
                description: String::new(),
            },
        );
        let enriched = LogEnricher::new(&config).enrich(entry, 0);
        assert_eq!(enriched.agent_type_name(), "file_search");

        let bare = LogEnricher::new(&config).enrich(LogEntry::default(), 1);
        assert!(bare.agent_type.is_none());
    }

    #[test]
    fn test_tool_errors_counted() {
        let mut entry = entry_with_response(Vec::new());
        entry.body.messages.push(Message::with_blocks(
            "user",
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: Some("t1".to_string()),
                    content: json!("command not found"),
                    is_error: true,
                },
                ContentBlock::tool_result("t2", json!("ok")),
            ],
        ));
        let config = WorkflowConfig::default();
        let enriched = LogEnricher::new(&config).enrich(entry, 0);
        assert_eq!(enriched.tool_errors, 1);
        assert!(enriched.has_errors);
    }

    #[test]
    fn test_enriched_log_flattens_entry() {
        let config = WorkflowConfig::default();
        let mut entry = entry_with_response(Vec::new());
        entry.timestamp = Some("2025-01-15T10:00:00Z".to_string());
        let enriched = LogEnricher::new(&config).enrich(entry, 2);

        let json = serde_json::to_value(&enriched).unwrap();
        assert_eq!(json["timestamp"], "2025-01-15T10:00:00Z");
        assert_eq!(json["log_index"], 2);
        assert_eq!(json["tool_info"]["has_tools"], false);

        let back: EnrichedLog = serde_json::from_value(json).unwrap();
        assert_eq!(back.log_index, 2);
        assert_eq!(back.entry.timestamp.as_deref(), Some("2025-01-15T10:00:00Z"));
    }
}
