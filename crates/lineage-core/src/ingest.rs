//! JSONL ingestion of captured log entries.
//!
//! One JSON object per line, arrival order preserved. A malformed line is
//! skipped with a recorded warning; it never aborts the run.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::types::LogEntry;

/// Header names whose values are scrubbed before entries reach the engine.
pub const REDACTED_HEADERS: &[&str] = &["authorization", "api-key", "x-api-key", "cookie"];

const REDACTED_VALUE: &str = "[REDACTED]";

/// A skipped input line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestWarning {
    /// 1-based line number within its file.
    pub line: usize,
    pub reason: String,
}

/// Result of reading one or more JSONL sources.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub entries: Vec<LogEntry>,
    pub warnings: Vec<IngestWarning>,
}

impl IngestReport {
    fn extend(&mut self, other: IngestReport) {
        let offset = self.entries.len();
        self.entries.extend(other.entries.into_iter().map(|mut e| {
            e.sequence += offset;
            e
        }));
        self.warnings.extend(other.warnings);
    }
}

/// Parse JSONL from `reader`, assigning sequence indices in arrival order.
///
/// Blank lines are ignored silently. Lines that are not a JSON object of the
/// expected shape become warnings. Only reader I/O failures are errors.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LogEntry>(&line) {
            Ok(mut entry) => {
                entry.sequence = report.entries.len();
                redact_headers(&mut entry);
                report.entries.push(entry);
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed log line");
                report.warnings.push(IngestWarning {
                    line: line_no,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Parse one JSONL file.
pub fn read_log_file(path: &Path) -> Result<IngestReport> {
    let file = std::fs::File::open(path)?;
    parse_jsonl(std::io::BufReader::new(file))
}

/// Scrub header values under the fixed redaction set (case-insensitive).
pub fn redact_headers(entry: &mut LogEntry) {
    for (name, value) in entry.headers.iter_mut() {
        let lower = name.to_ascii_lowercase();
        if REDACTED_HEADERS.contains(&lower.as_str()) {
            *value = REDACTED_VALUE.to_string();
        }
    }
}

/// `*.jsonl` files in `dir`, sorted by file name.
pub fn log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// Read every `*.jsonl` file in `dir` in file-name order.
///
/// Sequence indices continue across files, so the combined list keeps a
/// single arrival order.
pub fn read_log_dir(dir: &Path) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for path in log_files(dir)? {
        let file_report = read_log_file(&path)?;
        tracing::debug!(
            path = %path.display(),
            entries = file_report.entries.len(),
            warnings = file_report.warnings.len(),
            "Read log file"
        );
        report.extend(file_report);
    }
    Ok(report)
}

/// Latest modification time across the `*.jsonl` files in `dir`.
///
/// `None` when the directory holds no log files.
pub fn latest_mtime(dir: &Path) -> Result<Option<DateTime<Utc>>> {
    let mut latest: Option<DateTime<Utc>> = None;
    for path in log_files(dir)? {
        let modified: DateTime<Utc> = std::fs::metadata(&path)?.modified()?.into();
        latest = Some(match latest {
            Some(current) if current >= modified => current,
            _ => modified,
        });
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOOD: &str = r#"{"timestamp":"2025-01-15T10:00:00Z","headers":{"Authorization":"Bearer sk-1","content-type":"application/json"},"body":{"messages":[{"role":"user","content":"hi"}]}}"#;

    #[test]
    fn skips_bad_lines_and_keeps_order() {
        let input = format!("{GOOD}\nnot json\n\n{GOOD}\n[1,2]\n");
        let report = parse_jsonl(input.as_bytes()).unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].sequence, 0);
        assert_eq!(report.entries[1].sequence, 1);
        let lines: Vec<usize> = report.warnings.iter().map(|w| w.line).collect();
        assert_eq!(lines, vec![2, 5]);
    }

    #[test]
    fn redacts_sensitive_headers_case_insensitively() {
        let report = parse_jsonl(GOOD.as_bytes()).unwrap();
        let headers = &report.entries[0].headers;
        assert_eq!(headers["Authorization"], "[REDACTED]");
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn log_dir_continues_sequence_across_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jsonl", "b.jsonl"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            writeln!(f, "{GOOD}").unwrap();
            writeln!(f, "{GOOD}").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let report = read_log_dir(dir.path()).unwrap();
        let seqs: Vec<usize> = report.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert!(latest_mtime(dir.path()).unwrap().is_some());
    }

    #[test]
    fn empty_or_missing_dir_has_no_mtime() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_mtime(dir.path()).unwrap().is_none());
        assert!(read_log_dir(&dir.path().join("missing")).unwrap().entries.is_empty());
    }
}
