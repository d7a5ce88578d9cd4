//! Service behavior over a real log directory.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use lineage_core::EdgeKind;
use lineage_serve::{CacheTier, LineageService, ServeConfig};
use lineage_workflow::WorkflowConfig;

const LINES: &[&str] = &[
    r#"{"timestamp":"2025-01-15T10:00:00Z","headers":{"x-api-key":"sk-secret"},"body":{"messages":[{"role":"user","content":"list the crates"}]},"response":{"body":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls crates"}}],"stop_reason":"tool_use"}}}"#,
    r#"{"timestamp":"2025-01-15T10:00:04Z","body":{"messages":[{"role":"user","content":"list the crates"},{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls crates"}}]},{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"core serve"}]}]},"response":{"body":{"content":[{"type":"text","text":"Two crates."}],"stop_reason":"end_turn"}}}"#,
    "this line is not json",
];

fn write_log(path: &Path, lines: &[&str], mtime: SystemTime) {
    let mut file = File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.set_modified(mtime).unwrap();
}

fn service(dir: &Path) -> LineageService {
    let config = ServeConfig {
        log_dir: dir.to_path_buf(),
        build_timeout_secs: 10,
        ..Default::default()
    };
    LineageService::new(&config, WorkflowConfig::default())
}

#[tokio::test]
async fn logs_are_enriched_and_redacted() {
    let dir = tempfile::tempdir().unwrap();
    write_log(&dir.path().join("a.jsonl"), LINES, SystemTime::now());

    let logs = service(dir.path()).logs().await.unwrap();
    assert_eq!(logs.tier, CacheTier::Built);
    assert_eq!(logs.value.len(), 2);
    assert_eq!(logs.value[0].entry.headers["x-api-key"], "[REDACTED]");
    assert_eq!(logs.value[0].tool_info.tool_counts["Bash"], 1);
    assert_eq!(logs.value[1].log_index, 1);
}

#[tokio::test]
async fn workflow_is_cached_until_logs_change() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("a.jsonl");
    let base = SystemTime::now() - Duration::from_secs(3600);
    write_log(&log_path, LINES, base);

    let service = service(dir.path());
    let first = service.workflow().await.unwrap();
    assert_eq!(first.tier, CacheTier::Built);
    let graph = &first.value.workflow_graph;
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.metrics.edges_by_type[&EdgeKind::ToolResult], 1);
    assert!(dir.path().join(".workflow_cache.json").exists());

    let second = service.workflow().await.unwrap();
    assert_eq!(second.tier, CacheTier::Memory);

    write_log(&dir.path().join("b.jsonl"), &LINES[..1], base + Duration::from_secs(60));
    let third = service.workflow().await.unwrap();
    assert_eq!(third.tier, CacheTier::Built);
    assert_eq!(third.value.logs.len(), 3);
}

#[tokio::test]
async fn fresh_service_reads_disk_cache() {
    let dir = tempfile::tempdir().unwrap();
    write_log(&dir.path().join("a.jsonl"), LINES, SystemTime::now());

    service(dir.path()).workflow().await.unwrap();
    let restarted = service(dir.path()).workflow().await.unwrap();
    assert_eq!(restarted.tier, CacheTier::Disk);
    assert_eq!(restarted.value.workflow_graph.nodes.len(), 2);
}

#[tokio::test]
async fn export_requires_an_entities_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());
    assert!(service.latest_export().await.is_err());

    std::fs::write(dir.path().join("entities_extracted.json"), r#"{"entities": {}}"#).unwrap();
    let export = service.latest_export().await.unwrap();
    assert!(export["entities"].is_object());
}
