//! Configuration for agent-lineage tracking.

use serde::Deserialize;

/// Tracker configuration.
///
/// Loaded from `lineage.toml` `[tracker]` section or
/// `LINEAGE_TRACKER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Deepest truncation tried when matching a continuation (default: 5).
    #[serde(default = "default_max_backtrack")]
    pub max_backtrack: usize,

    /// Minimum normalized command length for prefix/suffix spawn matching.
    #[serde(default = "default_min_partial_command_len")]
    pub min_partial_command_len: usize,

    /// Characters of normalized text hashed for content-reuse matching.
    #[serde(default = "default_content_hash_chars")]
    pub content_hash_chars: usize,

    /// Tool whose `prompt` input spawns a sub-agent.
    #[serde(default = "default_task_tool_name")]
    pub task_tool_name: String,

    /// Tools whose `command` input may spawn a sub-process agent.
    #[serde(default = "default_shell_tool_names")]
    pub shell_tool_names: Vec<String>,
}

impl TrackerConfig {
    pub fn is_task_tool(&self, name: &str) -> bool {
        name == self.task_tool_name
    }

    pub fn is_shell_tool(&self, name: &str) -> bool {
        self.shell_tool_names.iter().any(|n| n == name)
    }
}

fn default_max_backtrack() -> usize {
    5
}

fn default_min_partial_command_len() -> usize {
    15
}

fn default_content_hash_chars() -> usize {
    200
}

fn default_task_tool_name() -> String {
    "Task".to_string()
}

fn default_shell_tool_names() -> Vec<String> {
    vec!["Bash".to_string()]
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_backtrack: default_max_backtrack(),
            min_partial_command_len: default_min_partial_command_len(),
            content_hash_chars: default_content_hash_chars(),
            task_tool_name: default_task_tool_name(),
            shell_tool_names: default_shell_tool_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_backtrack, 5);
        assert_eq!(config.min_partial_command_len, 15);
        assert!(config.is_task_tool("Task"));
        assert!(config.is_shell_tool("Bash"));
        assert!(!config.is_shell_tool("Read"));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: TrackerConfig =
            serde_json::from_value(serde_json::json!({"shell_tool_names": ["Bash", "Shell"]}))
                .unwrap();
        assert!(config.is_shell_tool("Shell"));
        assert_eq!(config.content_hash_chars, 200);
    }
}
