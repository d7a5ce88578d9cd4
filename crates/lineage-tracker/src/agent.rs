//! Reconstructed agent instances.

use serde::{Deserialize, Serialize};

use lineage_core::AgentId;

/// How a child agent was linked to its parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMethod {
    /// Opening message equals a Task tool prompt.
    Task,
    /// Opening message embeds a shell command issued by the parent.
    ToolCall,
}

/// Parent linkage recorded when a new agent is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnOrigin {
    pub parent_agent_id: AgentId,
    /// Tool-use id of the spawning Task or shell call.
    pub tool_use_id: String,
    pub method: SpawnMethod,
    /// Request in which the parent issued the spawning call.
    pub request_index: usize,
    pub tool_name: String,
    /// Index key of the matched command, for tool-call spawns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_hash: Option<String>,
}

/// First occurrence of a tool call made by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseRecord {
    pub tool_use_id: String,
    pub tool_name: String,
    pub request_index: usize,
    pub timestamp: Option<String>,
}

/// First occurrence of a tool result received by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultRecord {
    pub tool_use_id: String,
    pub request_index: usize,
    pub timestamp: Option<String>,
    pub is_error: bool,
}

/// A logical conversational actor inferred across many requests.
///
/// Exactly one instance owns any request index. Instances are created on
/// the first unmatched fingerprint and only ever grow afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub agent_id: AgentId,
    /// Defines the agent type; shared by many instances.
    pub system_prompt_hash: String,
    /// Fingerprint of the latest conversation state.
    pub conversation_fingerprint: String,
    pub requests: Vec<usize>,
    /// Per request, parallel to `requests`.
    pub timestamps: Vec<Option<String>>,
    /// Per request, parallel to `requests`.
    pub message_count_history: Vec<usize>,
    pub first_user_message: String,
    pub spawn: Option<SpawnOrigin>,
    pub child_agent_ids: Vec<AgentId>,
    pub tool_uses: Vec<ToolUseRecord>,
    pub tool_results: Vec<ToolResultRecord>,
}

impl AgentInstance {
    pub(crate) fn new(
        agent_id: AgentId,
        system_prompt_hash: String,
        conversation_fingerprint: String,
        first_user_message: String,
    ) -> Self {
        Self {
            agent_id,
            system_prompt_hash,
            conversation_fingerprint,
            requests: Vec::new(),
            timestamps: Vec::new(),
            message_count_history: Vec::new(),
            first_user_message,
            spawn: None,
            child_agent_ids: Vec::new(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub(crate) fn record_request(
        &mut self,
        request_index: usize,
        message_count: usize,
        timestamp: Option<&str>,
    ) {
        self.requests.push(request_index);
        self.message_count_history.push(message_count);
        self.timestamps.push(timestamp.map(String::from));
    }

    pub(crate) fn add_child(&mut self, child: &AgentId) {
        if !self.child_agent_ids.contains(child) {
            self.child_agent_ids.push(child.clone());
        }
    }

    pub fn parent_agent_id(&self) -> Option<&AgentId> {
        self.spawn.as_ref().map(|s| &s.parent_agent_id)
    }

    pub fn is_root(&self) -> bool {
        self.spawn.is_none()
    }

    pub fn first_request(&self) -> Option<usize> {
        self.requests.first().copied()
    }

    pub fn last_request(&self) -> Option<usize> {
        self.requests.last().copied()
    }

    pub fn first_timestamp(&self) -> Option<&str> {
        self.timestamps.first().and_then(|t| t.as_deref())
    }

    pub fn last_timestamp(&self) -> Option<&str> {
        self.timestamps.last().and_then(|t| t.as_deref())
    }

    /// Export view with derived counters.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.agent_id.clone(),
            system_prompt_hash: self.system_prompt_hash.clone(),
            conversation_fingerprint: self.conversation_fingerprint.clone(),
            requests: self.requests.clone(),
            first_request_id: self.first_request(),
            last_request_id: self.last_request(),
            message_count_history: self.message_count_history.clone(),
            timestamps: self.timestamps.clone(),
            spawned_by_task_id: self.spawn.as_ref().map(|s| s.tool_use_id.clone()),
            parent_agent_id: self.parent_agent_id().cloned(),
            child_agent_ids: self.child_agent_ids.clone(),
            first_user_message: self.first_user_message.chars().take(200).collect(),
            total_requests: self.requests.len(),
            conversation_turns: self.message_count_history.len(),
            tool_use_count: self.tool_uses.len(),
            tool_result_count: self.tool_results.len(),
            first_timestamp: self.first_timestamp().map(String::from),
            last_timestamp: self.last_timestamp().map(String::from),
        }
    }
}

/// Serialized form of an agent instance in the export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub system_prompt_hash: String,
    pub conversation_fingerprint: String,
    pub requests: Vec<usize>,
    pub first_request_id: Option<usize>,
    pub last_request_id: Option<usize>,
    pub message_count_history: Vec<usize>,
    pub timestamps: Vec<Option<String>>,
    pub spawned_by_task_id: Option<String>,
    pub parent_agent_id: Option<AgentId>,
    pub child_agent_ids: Vec<AgentId>,
    pub first_user_message: String,
    pub total_requests: usize,
    pub conversation_turns: usize,
    pub tool_use_count: usize,
    pub tool_result_count: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

/// Iteratively built subtree rooted at one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentTree {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub depth: usize,
    pub request_count: usize,
    pub children: Vec<AgentTree>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_child_is_idempotent() {
        let mut agent = AgentInstance::new(
            AgentId::from_counter(0),
            "no_system".into(),
            "fp".into(),
            String::new(),
        );
        let child = AgentId::from_counter(1);
        agent.add_child(&child);
        agent.add_child(&child);
        assert_eq!(agent.child_agent_ids, vec![child]);
    }

    #[test]
    fn snapshot_truncates_first_message_and_counts() {
        let mut agent = AgentInstance::new(
            AgentId::from_counter(3),
            "abc".into(),
            "fp".into(),
            "x".repeat(500),
        );
        agent.record_request(4, 1, Some("2025-01-15T10:00:00Z"));
        agent.record_request(6, 3, None);

        let snap = agent.snapshot();
        assert_eq!(snap.first_user_message.len(), 200);
        assert_eq!(snap.first_request_id, Some(4));
        assert_eq!(snap.last_request_id, Some(6));
        assert_eq!(snap.conversation_turns, 2);
        assert_eq!(snap.first_timestamp.as_deref(), Some("2025-01-15T10:00:00Z"));
        assert_eq!(snap.last_timestamp, None);
        assert!(snap.parent_agent_id.is_none());
    }
}
