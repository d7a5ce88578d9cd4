//! End-to-end lineage scenarios driven through the extractor.
//!
//! Each test builds a small captured log by hand and checks the agents and
//! edges reconstructed from it.

use lineage_core::types::{
    ContentBlock, LogEntry, Message, RequestBody, ResponseBody, ResponseEnvelope, SystemPrompt,
};
use lineage_core::{AgentId, EdgeKind};
use lineage_tracker::{AgentLineageTracker, EntityExtractor, SpawnMethod};
use serde_json::json;

const MAIN_PROMPT: &str = "You are the main interactive agent";
const SUB_PROMPT: &str = "You are a file search specialist";

fn request(system: &str, messages: Vec<Message>) -> RequestBody {
    RequestBody {
        system: SystemPrompt {
            blocks: vec![system.to_string()],
        },
        messages,
        ..Default::default()
    }
}

fn log(ts: &str, body: RequestBody, response: Vec<ContentBlock>) -> LogEntry {
    LogEntry {
        timestamp: Some(ts.to_string()),
        body,
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

fn agent_of(tracker: &AgentLineageTracker, request: usize) -> AgentId {
    tracker
        .agent_for_request(request)
        .map(|a| a.agent_id.clone())
        .expect("request was attributed")
}

#[test]
fn identical_replay_keeps_one_agent() {
    let mut tracker = AgentLineageTracker::default();
    let body = request(
        MAIN_PROMPT,
        vec![
            Message::user("fix the build"),
            Message::assistant("looking"),
            Message::user("thanks"),
        ],
    );
    tracker.identify_or_create_agent(0, &body, None);
    tracker.identify_or_create_agent(1, &body, None);

    assert_eq!(tracker.agents().len(), 1);
    assert_eq!(agent_of(&tracker, 0), agent_of(&tracker, 1));
}

#[test]
fn continuation_by_two_messages() {
    let mut tracker = AgentLineageTracker::default();
    tracker.identify_or_create_agent(0, &request(MAIN_PROMPT, vec![Message::user("hi")]), None);
    tracker.identify_or_create_agent(
        1,
        &request(
            MAIN_PROMPT,
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("hi")],
        ),
        None,
    );

    assert_eq!(tracker.agents().len(), 1);
    assert_eq!(tracker.agents()[0].message_count_history, vec![1, 3]);
}

#[test]
fn message_counts_never_decrease() {
    let mut tracker = AgentLineageTracker::default();
    let mut history = vec![Message::user("start")];
    for i in 0..8 {
        tracker.identify_or_create_agent(i, &request(MAIN_PROMPT, history.clone()), None);
        // Replay of the same state, then grow by a tool round trip.
        tracker.identify_or_create_agent(100 + i, &request(MAIN_PROMPT, history.clone()), None);
        let id = format!("toolu_{i}");
        history.push(Message::with_blocks(
            "assistant",
            vec![ContentBlock::tool_use(&id, "Read", json!({"n": i}))],
        ));
        history.push(Message::with_blocks(
            "user",
            vec![ContentBlock::tool_result(&id, json!(format!("out {i}")))],
        ));
    }

    assert_eq!(tracker.agents().len(), 1);
    for agent in tracker.agents() {
        assert!(agent
            .message_count_history
            .windows(2)
            .all(|pair| pair[0] <= pair[1]));
    }
}

#[test]
fn task_prompt_spawns_child_agent() {
    let mut extractor = EntityExtractor::default();
    let mut entries = Vec::new();
    // Requests 0-4: the main agent working.
    let mut history = vec![Message::user("triage the bug")];
    for i in 0..5 {
        let response = if i == 4 {
            vec![ContentBlock::tool_use(
                "toolu_task",
                "Task",
                json!({
                    "prompt": "Investigate bug X",
                    "description": "investigate",
                    "subagent_type": "Explore",
                }),
            )]
        } else {
            vec![ContentBlock::text(format!("step {i}"))]
        };
        entries.push(log(
            &format!("2025-01-15T10:00:0{i}Z"),
            request(MAIN_PROMPT, history.clone()),
            response,
        ));
        history.push(Message::assistant(format!("step {i}")));
        history.push(Message::user(format!("continue {i}")));
    }
    // Requests 5-7: unrelated helper calls.
    for i in 5..8 {
        entries.push(log(
            &format!("2025-01-15T10:00:0{i}Z"),
            request("Generate a title", vec![Message::user(format!("title {i}"))]),
            vec![ContentBlock::text("Title")],
        ));
    }
    // Request 8: the spawned agent's first call.
    entries.push(log(
        "2025-01-15T10:00:09Z",
        request(SUB_PROMPT, vec![Message::user("Investigate bug X")]),
        vec![ContentBlock::text("found it")],
    ));

    extractor.process_entries(&entries);
    let tracker = extractor.tracker();
    let parent = agent_of(tracker, 4);
    let child = agent_of(tracker, 8);
    assert_ne!(parent, child);

    let child_agent = tracker.agent(&child).unwrap();
    let spawn = child_agent.spawn.as_ref().unwrap();
    assert_eq!(spawn.parent_agent_id, parent);
    assert_eq!(spawn.method, SpawnMethod::Task);
    assert_eq!(spawn.tool_use_id, "toolu_task");
    assert_eq!(tracker.agent(&parent).unwrap().child_agent_ids, vec![child.clone()]);

    let dag = tracker.build_workflow_dag();
    let spawn_edge = dag
        .edges
        .iter()
        .find(|e| e.kind == EdgeKind::SubagentSpawn)
        .unwrap();
    assert_eq!(spawn_edge.source, parent);
    assert_eq!(spawn_edge.target, child);
    assert_eq!(spawn_edge.source_request, Some(4));
    assert!((spawn_edge.confidence - 0.95).abs() < f64::EPSILON);
    assert_eq!(spawn_edge.metadata["spawn_method"], "task");

    let summary = extractor.summary();
    assert_eq!(summary.task_types["Explore"], 1);
}

#[test]
fn shell_command_spawns_child_agent() {
    let mut tracker = AgentLineageTracker::default();
    tracker.identify_or_create_agent(0, &request(MAIN_PROMPT, vec![Message::user("list py")]), None);
    tracker.track_tool_use(
        0,
        &ContentBlock::tool_use(
            "toolu_bash",
            "Bash",
            json!({"command": r#"find ./analysis/scripts -name "*.py" 2>/dev/null | head -5"#}),
        ),
        None,
    );

    let opening = "<policy_spec>check commands</policy_spec>\nCommand: find ./analysis/scripts -name *.py\nOutput:";
    tracker.identify_or_create_agent(1, &request(SUB_PROMPT, vec![Message::user(opening)]), None);

    let child = tracker.agent_for_request(1).unwrap();
    let spawn = child.spawn.as_ref().unwrap();
    assert_eq!(spawn.method, SpawnMethod::ToolCall);
    assert_eq!(spawn.parent_agent_id, AgentId::from_counter(0));
    assert!(spawn.command_hash.is_some());

    let dag = tracker.build_workflow_dag();
    let edge = dag
        .edges
        .iter()
        .find(|e| e.kind == EdgeKind::SubagentSpawn)
        .unwrap();
    assert_eq!(edge.metadata["spawn_method"], "tool_call");
    assert!(edge.metadata.get("spawned_by_task_id").is_none());
}

#[test]
fn short_command_does_not_partially_match() {
    let mut tracker = AgentLineageTracker::default();
    tracker.identify_or_create_agent(0, &request(MAIN_PROMPT, vec![Message::user("go")]), None);
    tracker.track_tool_use(
        0,
        &ContentBlock::tool_use("t1", "Bash", json!({"command": "ls -la /var/log/nginx"})),
        None,
    );
    tracker.identify_or_create_agent(
        1,
        &request(SUB_PROMPT, vec![Message::user("Command: ls -la")]),
        None,
    );
    assert!(tracker.agent_for_request(1).unwrap().spawn.is_none());
}

#[test]
fn content_reuse_is_causal_and_cross_agent() {
    let mut extractor = EntityExtractor::default();
    let summary_text = "The parser fails on nested generics because the lexer splits >> early.";
    let entries = vec![
        log(
            "2025-01-15T10:00:00Z",
            request(SUB_PROMPT, vec![Message::user("explain the parser failure")]),
            vec![ContentBlock::text(summary_text)],
        ),
        log(
            "2025-01-15T10:00:05Z",
            request(MAIN_PROMPT, vec![Message::user(summary_text)]),
            vec![ContentBlock::text("ok")],
        ),
        // Replays the reused text again; no second edge.
        log(
            "2025-01-15T10:00:07Z",
            request(
                MAIN_PROMPT,
                vec![
                    Message::user(summary_text),
                    Message::assistant("ok"),
                    Message::user("fix it"),
                ],
            ),
            vec![ContentBlock::text(summary_text)],
        ),
    ];
    extractor.process_entries(&entries);

    let reuse: Vec<_> = extractor
        .tracker()
        .edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::ContentReuse)
        .collect();
    assert_eq!(reuse.len(), 1);
    for edge in &reuse {
        assert!(edge.source_request < edge.target_request);
        assert_ne!(edge.source, edge.target);
    }
}

#[test]
fn dedup_totals_balance() {
    let mut extractor = EntityExtractor::default();
    let mut history = vec![Message::user("refactor")];
    let mut entries = Vec::new();
    for i in 0..4 {
        let id = format!("toolu_{i}");
        let call = ContentBlock::tool_use(&id, "Edit", json!({"file": i}));
        entries.push(log(
            "2025-01-15T10:00:00Z",
            request(MAIN_PROMPT, history.clone()),
            vec![call.clone()],
        ));
        history.push(Message::with_blocks("assistant", vec![call]));
        history.push(Message::with_blocks(
            "user",
            vec![ContentBlock::tool_result(&id, json!("ok"))],
        ));
    }
    extractor.process_entries(&entries);

    let dedup = extractor.deduplicator();
    for entity in dedup.unique_entities(None) {
        assert_eq!(entity.occurrence_count, entity.seen_in_requests.len());
    }
    let stats = dedup.stats();
    assert_eq!(stats.total_unique_entities, 4);
    assert_eq!(
        stats.total_occurrences - stats.total_unique_entities,
        stats.duplicates_removed
    );
    // toolu_0 appears in requests 0..=3, toolu_3 only in request 3.
    assert_eq!(stats.total_occurrences, 4 + 3 + 2 + 1);

    let tool_result_edges = extractor
        .tracker()
        .edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::ToolResult)
        .count();
    assert_eq!(tool_result_edges, 3);
}

#[test]
fn export_serializes_expected_sections() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("requests.jsonl");
    let line = json!({
        "timestamp": "2025-01-15T10:00:00Z",
        "headers": {"x-api-key": "secret"},
        "body": {
            "system": [{"type": "text", "text": MAIN_PROMPT}],
            "tools": [{"name": "Read", "description": "Read a file", "input_schema": {}}],
            "messages": [{"role": "user", "content": "hi"}]
        },
        "response": {"status": 200, "body": {"content": [{"type": "text", "text": "hello"}], "stop_reason": "end_turn"}}
    });
    std::fs::write(&input, format!("{line}\nnot json\n")).unwrap();

    let mut extractor = EntityExtractor::default();
    extractor.extract_from_file(&input).unwrap();
    let out = dir.path().join("entities_test.json");
    extractor.export().write_json(&out).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(doc["metadata"]["summary"]["warnings"], 1);
    assert_eq!(doc["entities"]["api_requests"][0]["headers"]["x-api-key"], "[REDACTED]");
    assert_eq!(doc["entities"]["tool_definitions"][0]["name"], "Read");
    assert_eq!(doc["relationships"]["request_to_agent"]["0"], "agent_0");
    assert_eq!(doc["workflow_dag"]["root_agent_ids"][0], "agent_0");
}
