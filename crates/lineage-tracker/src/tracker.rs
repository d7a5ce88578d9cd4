//! Agent-instance identification and lineage edges.
//!
//! The tracker consumes requests strictly in log order. Later detections
//! depend on indexes earlier requests populated: a tool result can only be
//! linked once its tool use was seen, a child can only find its parent once
//! the parent's Task prompt or shell command was registered.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};

use lineage_core::types::{ContentBlock, Message, RequestBody};
use lineage_core::{parse_timestamp, AgentEdge, AgentId, EdgeKind};
use lineage_fingerprint::{
    compute_hash, fingerprint_conversation, fingerprint_text, normalize_command,
    system_prompt_hash, FINGERPRINT_LEN,
};

use crate::agent::{
    AgentInstance, AgentSnapshot, AgentTree, SpawnMethod, SpawnOrigin, ToolResultRecord,
    ToolUseRecord,
};
use crate::command::{extract_command, CommandIndex, CommandSite};
use crate::config::TrackerConfig;

/// Where a tool call originated (first occurrence only).
#[derive(Debug, Clone)]
struct ToolUseSite {
    agent: usize,
    request_index: usize,
    tool_name: String,
}

/// A registered Task prompt awaiting its spawned agent.
#[derive(Debug, Clone)]
struct TaskSpawn {
    tool_use_id: String,
    parent: usize,
    request_index: usize,
    tool_name: String,
}

/// A response whose text may be reused as later input.
#[derive(Debug, Clone, Copy)]
struct ContentSource {
    agent: usize,
    request_index: usize,
}

/// Aggregate statistics over all tracked agents.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentStatistics {
    pub total_agents: usize,
    pub total_requests: usize,
    pub avg_requests_per_agent: f64,
    pub root_agents: usize,
    pub child_agents: usize,
    pub unique_agent_types: usize,
    pub agent_type_distribution: BTreeMap<String, usize>,
}

/// Agent-level DAG node.
#[derive(Debug, Clone, Serialize)]
pub struct AgentNode {
    pub id: AgentId,
    pub agent_type: String,
    pub parent_agent_id: Option<AgentId>,
    pub child_agent_ids: Vec<AgentId>,
    pub spawned_by_task_id: Option<String>,
    pub request_count: usize,
    pub tool_use_count: usize,
    pub tool_result_count: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub is_root: bool,
    pub is_leaf: bool,
}

/// Counts summarizing an agent-level DAG.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AgentDagMetrics {
    pub total_agents: usize,
    pub root_agents: usize,
    pub leaf_agents: usize,
    pub total_edges: usize,
    pub edges_by_type: BTreeMap<EdgeKind, usize>,
}

/// Agents as nodes, lineage relationships as typed edges.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDag {
    pub nodes: Vec<AgentNode>,
    pub edges: Vec<AgentEdge>,
    pub metrics: AgentDagMetrics,
    pub root_agent_ids: Vec<AgentId>,
}

/// Stateful agent-lineage engine.
///
/// Owned exclusively by a single reconstruction pass. Agents live in an
/// arena indexed by creation order, so `agent_N` sits at position `N`.
#[derive(Debug, Default)]
pub struct AgentLineageTracker {
    config: TrackerConfig,
    agents: Vec<AgentInstance>,
    fingerprint_to_agent: HashMap<String, usize>,
    request_to_agent: BTreeMap<usize, usize>,
    task_prompts: HashMap<String, TaskSpawn>,
    command_index: CommandIndex,
    tool_use_index: HashMap<String, ToolUseSite>,
    tool_results_seen: HashSet<String>,
    response_content: HashMap<String, Vec<ContentSource>>,
    content_reuse_seen: HashSet<(usize, usize, String)>,
    /// Append-only `tool_result` and `content_reuse` edges.
    edges: Vec<AgentEdge>,
}

impl AgentLineageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn agents(&self) -> &[AgentInstance] {
        &self.agents
    }

    pub fn agent(&self, id: &AgentId) -> Option<&AgentInstance> {
        self.position(id).map(|pos| &self.agents[pos])
    }

    /// Agent owning `request_index`, if the request was identified.
    pub fn agent_for_request(&self, request_index: usize) -> Option<&AgentInstance> {
        self.request_to_agent
            .get(&request_index)
            .map(|&pos| &self.agents[pos])
    }

    pub fn request_to_agent(&self) -> BTreeMap<usize, AgentId> {
        self.request_to_agent
            .iter()
            .map(|(&req, &pos)| (req, self.agents[pos].agent_id.clone()))
            .collect()
    }

    /// Emitted `tool_result` and `content_reuse` edges, in emission order.
    pub fn edges(&self) -> &[AgentEdge] {
        &self.edges
    }

    fn position(&self, id: &AgentId) -> Option<usize> {
        let n: usize = id.as_str().strip_prefix("agent_")?.parse().ok()?;
        (n < self.agents.len()).then_some(n)
    }

    // ── Identification ────────────────────────────────────────────

    /// Attribute a request to an agent, creating one when no existing
    /// conversation explains it.
    ///
    /// Order of evaluation: exact replay, continuation by backtracked
    /// fingerprint with matching system prompt, then a new agent with
    /// Task-prompt or shell-command parent detection.
    pub fn identify_or_create_agent(
        &mut self,
        request_index: usize,
        body: &RequestBody,
        timestamp: Option<&str>,
    ) -> &AgentInstance {
        let messages = &body.messages;
        let system_hash = system_prompt_hash(&body.system);
        let fingerprint = fingerprint_conversation(messages);

        if let Some(&pos) = self.fingerprint_to_agent.get(&fingerprint) {
            tracing::trace!(request_index, agent = %self.agents[pos].agent_id, "Exact replay");
            self.agents[pos].record_request(request_index, messages.len(), timestamp);
            self.request_to_agent.insert(request_index, pos);
            return &self.agents[pos];
        }

        if let Some(pos) = self.find_parent_conversation(messages, &system_hash) {
            let agent = &mut self.agents[pos];
            let old = std::mem::replace(&mut agent.conversation_fingerprint, fingerprint.clone());
            agent.record_request(request_index, messages.len(), timestamp);
            tracing::trace!(request_index, agent = %agent.agent_id, "Continuation");

            if self.fingerprint_to_agent.get(&old) == Some(&pos) {
                self.fingerprint_to_agent.remove(&old);
            }
            self.fingerprint_to_agent.insert(fingerprint, pos);
            self.request_to_agent.insert(request_index, pos);
            return &self.agents[pos];
        }

        let pos = self.agents.len();
        let agent_id = AgentId::from_counter(pos);
        let first_user_message = body.first_user_message().unwrap_or_default().to_string();

        let mut agent = AgentInstance::new(
            agent_id.clone(),
            system_hash,
            fingerprint.clone(),
            first_user_message.clone(),
        );
        agent.record_request(request_index, messages.len(), timestamp);
        agent.spawn = self
            .detect_task_spawn(&first_user_message)
            .or_else(|| self.detect_tool_spawn(&first_user_message));

        if let Some(spawn) = &agent.spawn {
            tracing::debug!(
                request_index,
                agent = %agent_id,
                parent = %spawn.parent_agent_id,
                method = ?spawn.method,
                "Detected sub-agent spawn"
            );
            if let Some(parent) = self.position(&spawn.parent_agent_id) {
                self.agents[parent].add_child(&agent_id);
            }
        } else {
            tracing::debug!(request_index, agent = %agent_id, "New root agent");
        }

        self.agents.push(agent);
        self.fingerprint_to_agent.insert(fingerprint, pos);
        self.request_to_agent.insert(request_index, pos);
        &self.agents[pos]
    }

    /// Agent whose conversation, with 1..=K trailing messages dropped,
    /// equals this one and whose system prompt matches.
    fn find_parent_conversation(&self, messages: &[Message], system_hash: &str) -> Option<usize> {
        if messages.len() <= 1 {
            return None;
        }
        let max_backtrack = (messages.len() - 1).min(self.config.max_backtrack);

        (1..=max_backtrack).find_map(|backtrack| {
            let truncated = fingerprint_conversation(&messages[..messages.len() - backtrack]);
            let pos = *self.fingerprint_to_agent.get(&truncated)?;
            (self.agents[pos].system_prompt_hash == system_hash).then_some(pos)
        })
    }

    fn detect_task_spawn(&self, first_user_message: &str) -> Option<SpawnOrigin> {
        if first_user_message.is_empty() {
            return None;
        }
        let task = self
            .task_prompts
            .get(&compute_hash(first_user_message, FINGERPRINT_LEN))?;
        Some(SpawnOrigin {
            parent_agent_id: self.agents[task.parent].agent_id.clone(),
            tool_use_id: task.tool_use_id.clone(),
            method: SpawnMethod::Task,
            request_index: task.request_index,
            tool_name: task.tool_name.clone(),
            command_hash: None,
        })
    }

    fn detect_tool_spawn(&self, first_user_message: &str) -> Option<SpawnOrigin> {
        let command = extract_command(first_user_message)?;
        let (key, site) = self
            .command_index
            .find(&command, self.config.min_partial_command_len)?;
        Some(SpawnOrigin {
            parent_agent_id: site.parent_agent_id.clone(),
            tool_use_id: site.tool_use_id.clone(),
            method: SpawnMethod::ToolCall,
            request_index: site.request_index,
            tool_name: site.tool_name.clone(),
            command_hash: Some(key.to_string()),
        })
    }

    // ── Tool tracking ─────────────────────────────────────────────

    /// Record a tool call. Only the first occurrence of an id counts; later
    /// requests replaying the same block are ignored.
    ///
    /// Task calls register their prompt for spawn matching; shell calls
    /// register their normalized command.
    pub fn track_tool_use(
        &mut self,
        request_index: usize,
        block: &ContentBlock,
        timestamp: Option<&str>,
    ) {
        let ContentBlock::ToolUse {
            id: Some(tool_use_id),
            name,
            input,
        } = block
        else {
            return;
        };
        let Some(&pos) = self.request_to_agent.get(&request_index) else {
            return;
        };
        if self.tool_use_index.contains_key(tool_use_id) {
            return;
        }

        self.tool_use_index.insert(
            tool_use_id.clone(),
            ToolUseSite {
                agent: pos,
                request_index,
                tool_name: name.clone(),
            },
        );
        self.agents[pos].tool_uses.push(ToolUseRecord {
            tool_use_id: tool_use_id.clone(),
            tool_name: name.clone(),
            request_index,
            timestamp: timestamp.map(String::from),
        });

        if self.config.is_task_tool(name) {
            let prompt = input.get("prompt").and_then(Value::as_str).unwrap_or_default();
            if !prompt.is_empty() {
                self.task_prompts
                    .entry(compute_hash(prompt, FINGERPRINT_LEN))
                    .or_insert_with(|| TaskSpawn {
                        tool_use_id: tool_use_id.clone(),
                        parent: pos,
                        request_index,
                        tool_name: name.clone(),
                    });
            }
        } else if self.config.is_shell_tool(name) {
            let command = input.get("command").and_then(Value::as_str).unwrap_or_default();
            let normalized_command = normalize_command(command);
            if !normalized_command.is_empty() {
                self.command_index.register(CommandSite {
                    tool_use_id: tool_use_id.clone(),
                    parent_agent_id: self.agents[pos].agent_id.clone(),
                    request_index,
                    tool_name: name.clone(),
                    command: command.to_string(),
                    normalized_command,
                });
            }
        }
    }

    /// Record a tool result and link it to the agent that issued the call.
    ///
    /// First occurrence only, so each tool-use id yields at most one
    /// `tool_result` edge.
    pub fn track_tool_result(
        &mut self,
        request_index: usize,
        block: &ContentBlock,
        timestamp: Option<&str>,
    ) {
        let ContentBlock::ToolResult {
            tool_use_id: Some(tool_use_id),
            is_error,
            ..
        } = block
        else {
            return;
        };
        let Some(&pos) = self.request_to_agent.get(&request_index) else {
            return;
        };
        if !self.tool_results_seen.insert(tool_use_id.clone()) {
            return;
        }

        self.agents[pos].tool_results.push(ToolResultRecord {
            tool_use_id: tool_use_id.clone(),
            request_index,
            timestamp: timestamp.map(String::from),
            is_error: *is_error,
        });

        if let Some(site) = self.tool_use_index.get(tool_use_id) {
            let edge = AgentEdge::new(
                EdgeKind::ToolResult,
                self.agents[site.agent].agent_id.clone(),
                self.agents[pos].agent_id.clone(),
            )
            .between_requests(site.request_index, request_index)
            .with_metadata(json!({
                "tool_use_id": tool_use_id,
                "tool_name": site.tool_name,
                "is_error": is_error,
            }));
            self.edges.push(edge);
        }
    }

    // ── Content reuse ─────────────────────────────────────────────

    /// Index the text of a response for later reuse detection.
    pub fn track_response_content(&mut self, request_index: usize, blocks: &[ContentBlock]) {
        let Some(&pos) = self.request_to_agent.get(&request_index) else {
            return;
        };
        let text = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let Some(hash) = fingerprint_text(&text, self.config.content_hash_chars) else {
            return;
        };
        self.response_content.entry(hash).or_default().push(ContentSource {
            agent: pos,
            request_index,
        });
    }

    /// Match this request's user texts against earlier responses of other
    /// agents and emit `content_reuse` edges.
    ///
    /// Sources must come strictly earlier in the log. Each (source request,
    /// target agent, hash) triple is emitted once, since later requests
    /// replay the same user text.
    pub fn track_request_content(&mut self, request_index: usize, messages: &[Message]) {
        let Some(&pos) = self.request_to_agent.get(&request_index) else {
            return;
        };

        let hashes: Vec<String> = messages
            .iter()
            .filter(|m| m.role == "user")
            .flat_map(|m| m.texts())
            .filter_map(|text| fingerprint_text(text, self.config.content_hash_chars))
            .collect();

        for hash in hashes {
            let Some(sources) = self.response_content.get(&hash) else {
                continue;
            };
            for source in sources {
                if source.request_index >= request_index || source.agent == pos {
                    continue;
                }
                if !self
                    .content_reuse_seen
                    .insert((source.request_index, pos, hash.clone()))
                {
                    continue;
                }
                let edge = AgentEdge::new(
                    EdgeKind::ContentReuse,
                    self.agents[source.agent].agent_id.clone(),
                    self.agents[pos].agent_id.clone(),
                )
                .between_requests(source.request_index, request_index)
                .with_metadata(json!({ "content_hash": hash }));
                self.edges.push(edge);
            }
        }
    }

    // ── Views ─────────────────────────────────────────────────────

    /// Consecutive-request edges per agent, with the wall-clock gap when
    /// both timestamps parse.
    pub fn request_sequence_edges(&self) -> Vec<AgentEdge> {
        let mut edges = Vec::new();
        for agent in &self.agents {
            let steps = agent.requests.iter().zip(&agent.timestamps);
            for ((&source, source_ts), (&target, target_ts)) in steps.clone().zip(steps.skip(1)) {
                let gap_ms = source_ts
                    .as_deref()
                    .and_then(parse_timestamp)
                    .zip(target_ts.as_deref().and_then(parse_timestamp))
                    .map(|(a, b)| (b - a).num_milliseconds());
                edges.push(
                    AgentEdge::new(
                        EdgeKind::RequestSequence,
                        agent.agent_id.clone(),
                        agent.agent_id.clone(),
                    )
                    .between_requests(source, target)
                    .with_metadata(json!({ "time_gap_ms": gap_ms })),
                );
            }
        }
        edges
    }

    fn spawn_edges(&self) -> Vec<AgentEdge> {
        self.agents
            .iter()
            .filter_map(|agent| {
                let spawn = agent.spawn.as_ref()?;
                let mut metadata = json!({
                    "spawn_method": spawn.method,
                    "spawned_by_tool_use_id": spawn.tool_use_id,
                    "tool_name": spawn.tool_name,
                });
                if spawn.method == SpawnMethod::Task {
                    metadata["spawned_by_task_id"] = json!(spawn.tool_use_id);
                }
                if let Some(hash) = &spawn.command_hash {
                    metadata["command_hash"] = json!(hash);
                }
                let mut edge = AgentEdge::new(
                    EdgeKind::SubagentSpawn,
                    spawn.parent_agent_id.clone(),
                    agent.agent_id.clone(),
                )
                .with_metadata(metadata);
                edge.source_request = Some(spawn.request_index);
                edge.target_request = agent.first_request();
                Some(edge)
            })
            .collect()
    }

    /// Assemble the agent-level workflow DAG.
    ///
    /// Edges: spawns first, then tool results and content reuse in emission
    /// order, then request sequences. Calling this repeatedly yields the
    /// same DAG.
    pub fn build_workflow_dag(&self) -> AgentDag {
        let nodes: Vec<AgentNode> = self
            .agents
            .iter()
            .map(|a| AgentNode {
                id: a.agent_id.clone(),
                agent_type: a.system_prompt_hash.clone(),
                parent_agent_id: a.parent_agent_id().cloned(),
                child_agent_ids: a.child_agent_ids.clone(),
                spawned_by_task_id: a.spawn.as_ref().map(|s| s.tool_use_id.clone()),
                request_count: a.requests.len(),
                tool_use_count: a.tool_uses.len(),
                tool_result_count: a.tool_results.len(),
                first_timestamp: a.first_timestamp().map(String::from),
                last_timestamp: a.last_timestamp().map(String::from),
                is_root: a.is_root(),
                is_leaf: a.child_agent_ids.is_empty(),
            })
            .collect();

        let mut edges = self.spawn_edges();
        edges.extend(self.edges.iter().cloned());
        edges.extend(self.request_sequence_edges());

        let mut edges_by_type = BTreeMap::new();
        for edge in &edges {
            *edges_by_type.entry(edge.kind).or_insert(0) += 1;
        }

        let root_agent_ids: Vec<AgentId> = nodes
            .iter()
            .filter(|n| n.is_root)
            .map(|n| n.id.clone())
            .collect();

        AgentDag {
            metrics: AgentDagMetrics {
                total_agents: nodes.len(),
                root_agents: root_agent_ids.len(),
                leaf_agents: nodes.iter().filter(|n| n.is_leaf).count(),
                total_edges: edges.len(),
                edges_by_type,
            },
            nodes,
            edges,
            root_agent_ids,
        }
    }

    /// Parent → children, for every agent with a known parent.
    pub fn agent_hierarchy(&self) -> BTreeMap<AgentId, Vec<AgentId>> {
        let mut hierarchy: BTreeMap<AgentId, Vec<AgentId>> = BTreeMap::new();
        for agent in &self.agents {
            if let Some(parent) = agent.parent_agent_id() {
                hierarchy
                    .entry(parent.clone())
                    .or_default()
                    .push(agent.agent_id.clone());
            }
        }
        hierarchy
    }

    /// Subtree rooted at `root`, built without recursion.
    ///
    /// A pre-order walk with an explicit stack records each agent's depth
    /// and parent slot; the tree is then assembled bottom-up by walking
    /// that order in reverse.
    pub fn agent_tree(&self, root: &AgentId) -> Option<AgentTree> {
        let root_pos = self.position(root)?;

        // (agent position, depth, parent slot in `order`)
        let mut order: Vec<(usize, usize, Option<usize>)> = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root_pos, 0usize, None)];

        while let Some((pos, depth, parent_slot)) = stack.pop() {
            if !visited.insert(pos) {
                continue;
            }
            let slot = order.len();
            order.push((pos, depth, parent_slot));
            for child in self.agents[pos].child_agent_ids.iter().rev() {
                if let Some(child_pos) = self.position(child) {
                    stack.push((child_pos, depth + 1, Some(slot)));
                }
            }
        }

        let mut built: Vec<Option<AgentTree>> = order
            .iter()
            .map(|&(pos, depth, _)| {
                let agent = &self.agents[pos];
                Some(AgentTree {
                    agent_id: agent.agent_id.clone(),
                    agent_type: agent.system_prompt_hash.clone(),
                    depth,
                    request_count: agent.requests.len(),
                    children: Vec::new(),
                })
            })
            .collect();

        // Descendants sit after their ancestor in pre-order, so every
        // subtree is complete before it is moved into its parent.
        for slot in (1..order.len()).rev() {
            let Some(mut node) = built[slot].take() else {
                continue;
            };
            node.children.reverse();
            if let Some(parent) = order[slot].2.and_then(|p| built[p].as_mut()) {
                parent.children.push(node);
            }
        }

        let mut tree = built.first_mut()?.take()?;
        tree.children.reverse();
        Some(tree)
    }

    pub fn statistics(&self) -> AgentStatistics {
        let total_agents = self.agents.len();
        let total_requests: usize = self.agents.iter().map(|a| a.requests.len()).sum();
        let child_agents = self.agents.iter().filter(|a| !a.is_root()).count();

        let mut agent_type_distribution = BTreeMap::new();
        for agent in &self.agents {
            *agent_type_distribution
                .entry(agent.system_prompt_hash.clone())
                .or_insert(0) += 1;
        }

        AgentStatistics {
            total_agents,
            total_requests,
            avg_requests_per_agent: if total_agents > 0 {
                total_requests as f64 / total_agents as f64
            } else {
                0.0
            },
            root_agents: total_agents - child_agents,
            child_agents,
            unique_agent_types: agent_type_distribution.len(),
            agent_type_distribution,
        }
    }

    pub fn export_instances(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(AgentInstance::snapshot).collect()
    }
}
