//! Shell-command spawn matching.
//!
//! A sub-process agent started by a shell tool typically opens with a
//! `Command: <cmd>` preamble. The command is pulled out of that message,
//! normalized, and matched against the commands parents issued earlier.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use lineage_core::AgentId;
use lineage_fingerprint::{compute_hash, normalize_command, FINGERPRINT_LEN};

static RE_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Command:\s*").expect("command marker regex is valid"));

static RE_HEREDOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<<['"]?([A-Za-z_][A-Za-z0-9_]*)['"]?"#).expect("heredoc regex is valid")
});

/// Pull the command out of a sub-process agent's opening message.
///
/// Takes the text after `Command:`. A heredoc command runs through its
/// closing marker line; when no closer is found, or for plain commands,
/// only the first line is taken.
pub fn extract_command(message: &str) -> Option<String> {
    let marker = RE_COMMAND.find(message)?;
    let remaining = &message[marker.end()..];
    if remaining.is_empty() {
        return None;
    }

    if let Some(caps) = RE_HEREDOC.captures(remaining) {
        if let Some(end) = heredoc_end(remaining, &caps[1]) {
            return non_empty(remaining[..end].trim());
        }
    }

    non_empty(remaining.lines().next().unwrap_or_default().trim())
}

/// Byte offset just past the line that closes a heredoc started with
/// `marker`. The marker must open a line after the first.
fn heredoc_end(text: &str, marker: &str) -> Option<usize> {
    text.match_indices('\n').find_map(|(pos, _)| {
        let start = pos + 1 + marker.len();
        let rest = text[pos + 1..].strip_prefix(marker)?;
        closing_tail_len(rest).map(|len| start + len)
    })
}

/// Length of what follows a closing marker: optional `)`, `"`, `)`
/// closers (possibly on the next line), then whitespace up to a line
/// break or the end of the text. Shorter tails are tried when the full
/// one is followed by other text.
fn closing_tail_len(rest: &str) -> Option<usize> {
    let mut tail = rest.trim_start();
    let mut stops = vec![0, rest.len() - tail.len()];
    for closer in [')', '"', ')'] {
        if let Some(next) = tail.strip_prefix(closer) {
            tail = next;
            stops.push(rest.len() - tail.len());
        }
    }
    stops
        .into_iter()
        .rev()
        .find_map(|stop| line_break_end(&rest[stop..]).map(|len| stop + len))
}

fn line_break_end(s: &str) -> Option<usize> {
    let trimmed = s.trim_start();
    if trimmed.is_empty() {
        return Some(s.len());
    }
    s[..s.len() - trimmed.len()].rfind('\n').map(|i| i + 1)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// A shell command issued by a parent agent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandSite {
    pub tool_use_id: String,
    pub parent_agent_id: AgentId,
    pub request_index: usize,
    pub tool_name: String,
    pub command: String,
    pub normalized_command: String,
}

/// Normalized-command index that preserves registration order.
///
/// Partial matching returns the first registered candidate, so the scan
/// must walk entries in a fixed order.
#[derive(Debug, Default)]
pub struct CommandIndex {
    order: Vec<String>,
    sites: HashMap<String, CommandSite>,
}

impl CommandIndex {
    /// Register a command. The first site registered for a normalized
    /// command wins; returns `false` if one was already present.
    pub fn register(&mut self, site: CommandSite) -> bool {
        let key = compute_hash(&site.normalized_command, FINGERPRINT_LEN);
        if self.sites.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.sites.insert(key, site);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Find the parent command for a child's raw command.
    ///
    /// Exact normalized match first. Otherwise, when the child is at least
    /// `min_len` long, the first registered parent (also at least `min_len`)
    /// that the child prefixes, that prefixes the child, or that the child
    /// suffixes.
    pub fn find(&self, command: &str, min_len: usize) -> Option<(&str, &CommandSite)> {
        let child = normalize_command(command);
        if child.is_empty() {
            return None;
        }

        let key = compute_hash(&child, FINGERPRINT_LEN);
        if let Some((k, site)) = self.sites.get_key_value(&key) {
            return Some((k.as_str(), site));
        }

        if child.len() < min_len {
            return None;
        }

        self.order.iter().find_map(|key| {
            let site = self.sites.get(key)?;
            let parent = site.normalized_command.as_str();
            if parent.len() < min_len {
                return None;
            }
            let related = parent.starts_with(&child)
                || child.starts_with(parent)
                || parent.ends_with(&child);
            related.then_some((key.as_str(), site))
        })
    }
}
