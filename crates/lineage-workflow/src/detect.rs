//! Edge detectors run over one session at a time.
//!
//! Every detector takes the session's entries in chronological order and
//! returns edges between session-local positions. The builder shifts them
//! to global node indices afterwards.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use lineage_core::types::ContentBlock;
use lineage_core::{EdgeKind, LogEntry, WorkflowEdge};
use lineage_fingerprint::fingerprint_text;

use crate::config::WorkflowConfig;

const PREVIEW_CHARS: usize = 100;

/// Index key for a tool-use id. Scoping by session keeps colliding ids in
/// different sessions from ever matching.
fn session_key(session_id: usize, tool_use_id: &str) -> String {
    format!("session_{session_id}_{tool_use_id}")
}

struct ToolSite {
    position: usize,
    name: String,
}

/// Where each tool call of a session was made.
pub struct ToolIndex {
    session_id: usize,
    sites: HashMap<String, ToolSite>,
}

impl ToolIndex {
    /// Index every response tool use. The first response to use an id owns it.
    pub fn build(session_id: usize, entries: &[&LogEntry]) -> Self {
        let mut sites = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            for block in entry.response_blocks() {
                if let ContentBlock::ToolUse { id: Some(id), name, .. } = block {
                    sites
                        .entry(session_key(session_id, id))
                        .or_insert_with(|| ToolSite {
                            position,
                            name: name.clone(),
                        });
                }
            }
        }
        Self { session_id, sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Position and tool name of the call with this id.
    pub fn lookup(&self, tool_use_id: &str) -> Option<(usize, &str)> {
        self.sites
            .get(&session_key(self.session_id, tool_use_id))
            .map(|site| (site.position, site.name.as_str()))
    }
}

/// Link each tool call to the first later request that returns its result.
///
/// Later requests replay the same result in their history; those replays
/// add no edge.
pub fn match_tool_results(
    session_id: usize,
    entries: &[&LogEntry],
    index: &ToolIndex,
) -> Vec<WorkflowEdge> {
    let mut edges = Vec::new();
    let mut matched: HashSet<String> = HashSet::new();

    for (target, entry) in entries.iter().enumerate() {
        for message in &entry.body.messages {
            for block in message.blocks().iter() {
                let ContentBlock::ToolResult {
                    tool_use_id: Some(tool_use_id),
                    is_error,
                    ..
                } = block
                else {
                    continue;
                };
                let Some((source, tool_name)) = index.lookup(tool_use_id) else {
                    continue;
                };
                if source >= target || !matched.insert(tool_use_id.clone()) {
                    continue;
                }
                edges.push(
                    WorkflowEdge::new(EdgeKind::ToolResult, source, target, session_id)
                        .with_metadata(json!({
                            "tool_use_id": tool_use_id,
                            "tool_name": tool_name,
                            "is_error": is_error,
                        })),
                );
            }
        }
    }
    edges
}

/// Link each Task call to the request that starts the spawned agent.
///
/// The spawned agent's first message is the Task prompt, so the first later
/// entry whose first message text hashes like the prompt is the child. The
/// scan stops once entries fall outside the spawn window. No match, no edge.
pub fn detect_subagent_spawns(
    session_id: usize,
    entries: &[&LogEntry],
    config: &WorkflowConfig,
) -> Vec<WorkflowEdge> {
    let window = config.spawn_window();
    let mut edges = Vec::new();

    for (parent, entry) in entries.iter().enumerate() {
        let spawn_time = entry.parsed_timestamp();

        for block in entry.response_blocks() {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };
            if *name != config.task_tool_name {
                continue;
            }
            let Some(prompt_hash) = input
                .get("prompt")
                .and_then(Value::as_str)
                .and_then(|p| fingerprint_text(p, config.spawn_prompt_chars))
            else {
                continue;
            };

            for (child, candidate) in entries.iter().enumerate().skip(parent + 1) {
                let elapsed = match (spawn_time, candidate.parsed_timestamp()) {
                    (Some(spawned), Some(seen)) => Some(seen - spawned),
                    _ => None,
                };
                if elapsed.is_some_and(|e| e > window) {
                    break;
                }
                if elapsed.is_some_and(|e| e < chrono::Duration::zero()) {
                    continue;
                }

                let first_hash = candidate
                    .body
                    .messages
                    .first()
                    .and_then(|m| m.first_text())
                    .and_then(|t| fingerprint_text(t, config.spawn_prompt_chars));
                if first_hash.as_deref() != Some(prompt_hash.as_str()) {
                    continue;
                }

                edges.push(
                    WorkflowEdge::new(EdgeKind::SubagentSpawn, parent, child, session_id)
                        .with_metadata(json!({
                            "subagent_type": input.get("subagent_type"),
                            "task_tool_id": id,
                            "spawn_time": entry.timestamp,
                            "time_diff_seconds": elapsed.map(|e| e.num_milliseconds() as f64 / 1000.0),
                            "match_method": "prompt_hash",
                        })),
                );
                break;
            }
        }
    }
    edges
}

/// Link responses to later requests that quote their text in a user message.
///
/// At most one edge per (source, target) pair, always pointing forward.
pub fn detect_content_reuse(
    session_id: usize,
    entries: &[&LogEntry],
    config: &WorkflowConfig,
) -> Vec<WorkflowEdge> {
    let mut responses: HashMap<String, Vec<(usize, String)>> = HashMap::new();
    for (position, entry) in entries.iter().enumerate() {
        let Some(response) = &entry.response else {
            continue;
        };
        let text = response.body.text();
        if let Some(hash) = fingerprint_text(&text, config.content_hash_chars) {
            let preview: String = text
                .chars()
                .take(PREVIEW_CHARS)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            responses.entry(hash).or_default().push((position, preview));
        }
    }
    if responses.is_empty() {
        return Vec::new();
    }

    let mut edges = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (target, entry) in entries.iter().enumerate() {
        for message in entry.body.messages.iter().filter(|m| m.role == "user") {
            for text in message.texts() {
                let Some(hash) = fingerprint_text(text, config.content_hash_chars) else {
                    continue;
                };
                let Some(sources) = responses.get(&hash) else {
                    continue;
                };
                for (source, preview) in sources {
                    if *source >= target || !seen.insert((*source, target)) {
                        continue;
                    }
                    edges.push(
                        WorkflowEdge::new(EdgeKind::ContentReuse, *source, target, session_id)
                            .with_metadata(json!({
                                "content_preview": preview,
                                "match_method": "hash_200char",
                            })),
                    );
                }
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::types::{RequestBody, ResponseBody, ResponseEnvelope};
    use lineage_core::Message;

    fn entry(ts: Option<&str>, messages: Vec<Message>, response: Vec<ContentBlock>) -> LogEntry {
        LogEntry {
            timestamp: ts.map(String::from),
            body: RequestBody {
                messages,
                ..Default::default()
            },
            response: Some(ResponseEnvelope {
                body: ResponseBody {
                    content: response,
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn task_call(id: &str, prompt: &str) -> ContentBlock {
        ContentBlock::tool_use(
            id,
            "Task",
            json!({"subagent_type": "Explore", "prompt": prompt, "description": "explore"}),
        )
    }

    #[test]
    fn test_tool_result_matched_once() {
        let call = ContentBlock::tool_use("t1", "Bash", json!({"command": "ls"}));
        let result = Message::with_blocks("user", vec![ContentBlock::tool_result("t1", json!("a.rs"))]);
        let entries = vec![
            entry(None, vec![Message::user("list files")], vec![call]),
            entry(None, vec![result.clone()], vec![ContentBlock::text("done")]),
            entry(None, vec![result], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let index = ToolIndex::build(3, &refs);
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("t1"), Some((0, "Bash")));

        let edges = match_tool_results(3, &refs, &index);
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].source, edges[0].target), (0, 1));
        assert_eq!(edges[0].session_id, 3);
        assert_eq!(edges[0].metadata["tool_name"], "Bash");
        assert_eq!(edges[0].metadata["is_error"], false);
    }

    #[test]
    fn test_tool_index_is_session_scoped() {
        let entries = vec![entry(None, vec![], vec![ContentBlock::tool_use("t1", "Read", json!({}))])];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let index = ToolIndex::build(0, &refs);
        assert!(index.sites.contains_key("session_0_t1"));
        assert!(!index.sites.contains_key("session_1_t1"));
    }

    #[test]
    fn test_spawn_matches_first_prompt_hit() {
        let entries = vec![
            entry(Some("2025-01-15T10:00:00Z"), vec![Message::user("fix it")], vec![
                task_call("task1", "Investigate bug X"),
            ]),
            entry(Some("2025-01-15T10:00:05Z"), vec![Message::user("unrelated")], vec![]),
            entry(Some("2025-01-15T10:00:09Z"), vec![Message::user("Investigate   bug X")], vec![]),
            entry(Some("2025-01-15T10:00:12Z"), vec![Message::user("Investigate bug X")], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let edges = detect_subagent_spawns(0, &refs, &WorkflowConfig::default());

        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].source, edges[0].target), (0, 2));
        assert!((edges[0].confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(edges[0].metadata["subagent_type"], "Explore");
        assert_eq!(edges[0].metadata["task_tool_id"], "task1");
        assert_eq!(edges[0].metadata["time_diff_seconds"], 9.0);
        assert_eq!(edges[0].metadata["match_method"], "prompt_hash");
    }

    #[test]
    fn test_spawn_outside_window_not_matched() {
        let entries = vec![
            entry(Some("2025-01-15T10:00:00Z"), vec![], vec![task_call("task1", "Audit the parser")]),
            entry(Some("2025-01-15T11:00:01Z"), vec![Message::user("Audit the parser")], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        assert!(detect_subagent_spawns(0, &refs, &WorkflowConfig::default()).is_empty());
    }

    #[test]
    fn test_spawn_untimed_candidate_does_not_stop_scan() {
        let entries = vec![
            entry(Some("2025-01-15T10:00:00Z"), vec![], vec![task_call("task1", "Audit the parser")]),
            entry(Some("bogus"), vec![Message::user("Audit the parser")], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let edges = detect_subagent_spawns(0, &refs, &WorkflowConfig::default());
        assert_eq!(edges.len(), 1);
        assert!(edges[0].metadata["time_diff_seconds"].is_null());
    }

    #[test]
    fn test_spawn_without_prompt_emits_nothing() {
        let entries = vec![
            entry(None, vec![], vec![ContentBlock::tool_use("task1", "Task", json!({"prompt": "  "}))]),
            entry(None, vec![Message::user("")], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        assert!(detect_subagent_spawns(0, &refs, &WorkflowConfig::default()).is_empty());
    }

    #[test]
    fn test_content_reuse_forward_and_deduplicated() {
        let summary = "The loader reads lineage.toml and then the environment.";
        let entries = vec![
            entry(None, vec![Message::user("how is config loaded?")], vec![ContentBlock::text(summary)]),
            entry(None, vec![
                Message::user(summary),
                Message::with_blocks("user", vec![ContentBlock::text(summary)]),
            ], vec![]),
            entry(None, vec![Message::assistant(summary)], vec![]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        let edges = detect_content_reuse(0, &refs, &WorkflowConfig::default());

        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].source, edges[0].target), (0, 1));
        assert!((edges[0].confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(edges[0].metadata["content_preview"], summary);
    }

    #[test]
    fn test_content_reuse_never_backward() {
        let text = "Shared paragraph of findings";
        let entries = vec![
            entry(None, vec![Message::user(text)], vec![]),
            entry(None, vec![], vec![ContentBlock::text(text)]),
        ];
        let refs: Vec<&LogEntry> = entries.iter().collect();
        assert!(detect_content_reuse(0, &refs, &WorkflowConfig::default()).is_empty());
    }
}
