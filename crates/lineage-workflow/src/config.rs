//! Configuration for workflow graph construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Human-readable label for a family of agents sharing a system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTypeLabel {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl AgentTypeLabel {
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_string(),
            label: "Unknown Agent".to_string(),
            description: "Unclassified agent type".to_string(),
        }
    }
}

/// Workflow graph configuration.
///
/// Loaded from `lineage.toml` `[workflow]` section or
/// `LINEAGE_WORKFLOW__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Silence longer than this starts a new session (default: 10 minutes).
    #[serde(default = "default_session_gap_minutes")]
    pub session_gap_minutes: f64,

    /// Only the most recent entries of an oversized session are graphed.
    #[serde(default = "default_max_logs_per_session")]
    pub max_logs_per_session: usize,

    /// How far past a Task call the spawned request may appear (default: 1 hour).
    #[serde(default = "default_spawn_window_secs")]
    pub spawn_window_secs: i64,

    /// Characters of the Task prompt compared against first messages.
    #[serde(default = "default_spawn_prompt_chars")]
    pub spawn_prompt_chars: usize,

    /// Characters of response text compared against later inputs.
    #[serde(default = "default_content_hash_chars")]
    pub content_hash_chars: usize,

    #[serde(default = "default_task_tool_name")]
    pub task_tool_name: String,

    /// Known agent types keyed by the first 8 characters of the system
    /// prompt hash.
    #[serde(default)]
    pub agent_types: BTreeMap<String, AgentTypeLabel>,
}

impl WorkflowConfig {
    pub fn session_gap(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.session_gap_minutes * 60_000.0) as i64)
    }

    pub fn spawn_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.spawn_window_secs)
    }
}

fn default_session_gap_minutes() -> f64 {
    10.0
}

fn default_max_logs_per_session() -> usize {
    1000
}

fn default_spawn_window_secs() -> i64 {
    3600
}

fn default_spawn_prompt_chars() -> usize {
    300
}

fn default_content_hash_chars() -> usize {
    200
}

fn default_task_tool_name() -> String {
    "Task".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            session_gap_minutes: default_session_gap_minutes(),
            max_logs_per_session: default_max_logs_per_session(),
            spawn_window_secs: default_spawn_window_secs(),
            spawn_prompt_chars: default_spawn_prompt_chars(),
            content_hash_chars: default_content_hash_chars(),
            task_tool_name: default_task_tool_name(),
            agent_types: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkflowConfig::default();
        assert_eq!(config.max_logs_per_session, 1000);
        assert_eq!(config.session_gap(), chrono::Duration::minutes(10));
        assert_eq!(config.spawn_window(), chrono::Duration::hours(1));
        assert!(config.agent_types.is_empty());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: WorkflowConfig = serde_json::from_value(serde_json::json!({
            "session_gap_minutes": 2.5,
            "agent_types": {
                "0123abcd": {"name": "summarizer", "label": "Conversation Summarizer"}
            }
        }))
        .unwrap();
        assert_eq!(config.session_gap(), chrono::Duration::seconds(150));
        assert_eq!(config.spawn_prompt_chars, 300);
        assert_eq!(config.agent_types["0123abcd"].name, "summarizer");
        assert_eq!(config.agent_types["0123abcd"].description, "");
    }
}
