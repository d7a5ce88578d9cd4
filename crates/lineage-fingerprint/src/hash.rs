//! BLAKE3 content hashing.
//!
//! Digests are hex-encoded and truncated: 16 characters for fingerprints
//! and index keys, 8 for the per-block signatures inside a conversation
//! fingerprint.

use lineage_core::types::{ContentBlock, Message, SystemPrompt};

/// Width of conversation fingerprints and index keys.
pub const FINGERPRINT_LEN: usize = 16;

/// Width of per-block signatures.
pub const SIGNATURE_LEN: usize = 8;

const MESSAGE_SEPARATOR: &str = "|||";
const EMPTY_CONVERSATION: &str = "empty";
const NO_SYSTEM: &str = "no_system";

/// BLAKE3 of `text`, hex-encoded and truncated to `len` characters.
pub fn compute_hash(text: &str, len: usize) -> String {
    let mut hex = blake3::hash(text.as_bytes()).to_hex().to_string();
    hex.truncate(len.min(hex.len()));
    hex
}

/// Fingerprint of a conversation state.
///
/// Each message renders as `role:[sig,sig,...]` and the messages are joined
/// with `|||` before hashing. Block signatures cover content only:
/// `text:<h>`, `tool_use:<name>:<h(input)>`, `tool_result:<h(content)>`.
/// Identifiers are excluded, and block types without a signature are
/// skipped. An empty conversation hashes a fixed sentinel.
pub fn fingerprint_conversation(messages: &[Message]) -> String {
    if messages.is_empty() {
        return compute_hash(EMPTY_CONVERSATION, FINGERPRINT_LEN);
    }

    let parts: Vec<String> = messages
        .iter()
        .map(|msg| {
            let sigs: Vec<String> = msg.blocks().iter().filter_map(block_signature).collect();
            format!("{}:[{}]", msg.role, sigs.join(","))
        })
        .collect();

    compute_hash(&parts.join(MESSAGE_SEPARATOR), FINGERPRINT_LEN)
}

fn block_signature(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Text { text } => Some(format!("text:{}", compute_hash(text, SIGNATURE_LEN))),
        ContentBlock::ToolUse { name, input, .. } => Some(format!(
            "tool_use:{name}:{}",
            compute_hash(&input.to_string(), SIGNATURE_LEN)
        )),
        ContentBlock::ToolResult { content, .. } => Some(format!(
            "tool_result:{}",
            compute_hash(&content.to_string(), SIGNATURE_LEN)
        )),
        ContentBlock::Other { .. } => None,
    }
}

/// Hash of the non-empty system prompt texts joined with `|||`.
///
/// Requests without system text all share the `no_system` key.
pub fn system_prompt_hash(system: &SystemPrompt) -> String {
    let texts: Vec<&str> = system.texts().collect();
    if texts.is_empty() {
        return NO_SYSTEM.to_string();
    }
    compute_hash(&texts.join(MESSAGE_SEPARATOR), FINGERPRINT_LEN)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash of the first `chars` characters of the whitespace-normalized text.
///
/// `None` when nothing remains after normalization, so blank text never
/// matches anything.
pub fn fingerprint_text(text: &str, chars: usize) -> Option<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return None;
    }
    let truncated: String = normalized.chars().take(chars).collect();
    Some(compute_hash(&truncated, FINGERPRINT_LEN))
}

/// Reduce a shell command to its lower-cased ASCII alphanumerics.
///
/// Quoting, spacing, redirections and pipes disappear while command names,
/// path components and numeric arguments survive.
pub fn normalize_command(command: &str) -> String {
    command
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_deterministic_and_truncated() {
        let a = compute_hash("hello", 16);
        assert_eq!(a, compute_hash("hello", 16));
        assert_eq!(a.len(), 16);
        assert_eq!(compute_hash("hello", 8), a[..8]);
        assert_eq!(compute_hash("hello", 100).len(), 64);
    }

    #[test]
    fn fingerprint_ignores_tool_use_ids() {
        let with_ids = |use_id: &str| {
            vec![
                Message::user("list files"),
                Message::with_blocks(
                    "assistant",
                    vec![ContentBlock::tool_use(use_id, "Bash", json!({"command": "ls"}))],
                ),
                Message::with_blocks(
                    "user",
                    vec![ContentBlock::tool_result(use_id, json!("a.txt"))],
                ),
            ]
        };
        assert_eq!(
            fingerprint_conversation(&with_ids("toolu_A")),
            fingerprint_conversation(&with_ids("toolu_B"))
        );
    }

    #[test]
    fn string_and_single_text_block_fingerprint_alike() {
        let plain = vec![Message::user("hi")];
        let blocks = vec![Message::with_blocks("user", vec![ContentBlock::text("hi")])];
        assert_eq!(fingerprint_conversation(&plain), fingerprint_conversation(&blocks));
    }

    #[test]
    fn fingerprint_depends_on_role_and_order() {
        let a = vec![Message::user("x"), Message::assistant("y")];
        let b = vec![Message::assistant("y"), Message::user("x")];
        let c = vec![Message::assistant("x"), Message::assistant("y")];
        assert_ne!(fingerprint_conversation(&a), fingerprint_conversation(&b));
        assert_ne!(fingerprint_conversation(&a), fingerprint_conversation(&c));
    }

    #[test]
    fn empty_conversation_hashes_sentinel() {
        assert_eq!(fingerprint_conversation(&[]), compute_hash("empty", 16));
    }

    #[test]
    fn system_prompt_hash_without_text_is_no_system() {
        assert_eq!(system_prompt_hash(&SystemPrompt::default()), "no_system");
        let prompt = SystemPrompt {
            blocks: vec!["a".into(), String::new(), "b".into()],
        };
        assert_eq!(system_prompt_hash(&prompt), compute_hash("a|||b", 16));
    }

    #[test]
    fn text_fingerprint_normalizes_whitespace_and_truncates() {
        assert_eq!(
            fingerprint_text("  Investigate\n\tbug   X ", 200),
            fingerprint_text("Investigate bug X", 200)
        );
        assert_eq!(fingerprint_text("abcdef", 3), fingerprint_text("abcXYZ", 3));
        assert_eq!(fingerprint_text(" \n ", 200), None);
    }

    #[test]
    fn command_normalization_keeps_alphanumerics() {
        assert_eq!(
            normalize_command(r#"find . -name "*.py" 2>/dev/null | head -5"#),
            "findnamepy2devnullhead5"
        );
        assert_eq!(normalize_command("Git  Status"), "gitstatus");
    }
}
