//! Captured request/response log model.
//!
//! One `LogEntry` per captured API call. Every request embeds the whole
//! conversation so far, so the same logical block shows up again in each
//! later replayed history. Content blocks are decoded leniently: shapes the
//! model does not know are kept as `ContentBlock::Other` rather than failing
//! the whole line.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Log entry ─────────────────────────────────────────────────────

/// One captured request/response pair. Immutable once ingested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// Arrival order, assigned at ingestion. The only reliable ordering key.
    #[serde(default)]
    pub sequence: usize,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: RequestBody,
    #[serde(default)]
    pub response: Option<ResponseEnvelope>,
}

impl LogEntry {
    /// Parsed request timestamp, if present and well-formed.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// Response content blocks, or an empty slice when no response was captured.
    pub fn response_blocks(&self) -> &[ContentBlock] {
        self.response
            .as_ref()
            .map(|r| r.body.content.as_slice())
            .unwrap_or(&[])
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.response.as_ref()?.body.stop_reason.as_deref()
    }
}

/// Request body sent to the inference endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: SystemPrompt,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl RequestBody {
    /// Text of the first message when it is a user message: the string
    /// content, or the first text block.
    pub fn first_user_message(&self) -> Option<&str> {
        let first = self.messages.first()?;
        if first.role != "user" {
            return None;
        }
        first.first_text()
    }
}

/// System prompt blocks. Accepts either a bare string or a list of `{text}` blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct SystemPrompt {
    pub blocks: Vec<String>,
}

impl SystemPrompt {
    /// Non-empty block texts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(String::as_str).filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.texts().next().is_none()
    }
}

impl From<Value> for SystemPrompt {
    fn from(value: Value) -> Self {
        let blocks = match value {
            Value::String(s) => vec![s],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        };
        Self { blocks }
    }
}

impl From<SystemPrompt> for Value {
    fn from(prompt: SystemPrompt) -> Self {
        Value::Array(
            prompt
                .blocks
                .into_iter()
                .map(|text| serde_json::json!({ "type": "text", "text": text }))
                .collect(),
        )
    }
}

/// A tool advertised to the model in the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

// ── Messages ──────────────────────────────────────────────────────

/// One message of the conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn with_blocks(role: &str, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Content normalized to an ordered block sequence.
    pub fn blocks(&self) -> Cow<'_, [ContentBlock]> {
        self.content.blocks()
    }

    /// The string content, or the text of the first text block.
    pub fn first_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            MessageContent::Empty => None,
        }
    }

    /// Every text payload: the string content, or each text block.
    pub fn texts(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            MessageContent::Empty => Vec::new(),
        }
    }
}

/// Message content: a plain string or a sequence of typed blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    #[default]
    Empty,
}

impl MessageContent {
    pub fn blocks(&self) -> Cow<'_, [ContentBlock]> {
        match self {
            Self::Text(text) => Cow::Owned(vec![ContentBlock::Text { text: text.clone() }]),
            Self::Blocks(blocks) => Cow::Borrowed(blocks.as_slice()),
            Self::Empty => Cow::Borrowed(&[]),
        }
    }
}

impl From<Value> for MessageContent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Blocks(items.into_iter().map(ContentBlock::from).collect()),
            _ => Self::Empty,
        }
    }
}

impl From<MessageContent> for Value {
    fn from(content: MessageContent) -> Self {
        match content {
            MessageContent::Text(s) => Value::String(s),
            MessageContent::Blocks(blocks) => {
                Value::Array(blocks.into_iter().map(Value::from).collect())
            }
            MessageContent::Empty => Value::Null,
        }
    }
}

/// A typed content block.
///
/// `ToolUse::id` and `ToolResult::tool_use_id` are volatile identifiers:
/// stable across replays of the same block but never part of a content
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: Option<String>,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: Option<String>,
        content: Value,
        is_error: bool,
    },
    /// Any other block type (images, thinking, ...) or a non-object element.
    Other {
        block_type: String,
        raw: Value,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: &str, name: &str, input: Value) -> Self {
        Self::ToolUse {
            id: Some(id.to_string()),
            name: name.to_string(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: &str, content: Value) -> Self {
        Self::ToolResult {
            tool_use_id: Some(tool_use_id.to_string()),
            content,
            is_error: false,
        }
    }

    pub fn block_type(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Other { block_type, .. } => block_type,
        }
    }
}

impl From<Value> for ContentBlock {
    fn from(value: Value) -> Self {
        let str_field = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);

        match value.get("type").and_then(Value::as_str) {
            Some("text") => Self::Text {
                text: str_field("text").unwrap_or_default(),
            },
            Some("tool_use") => Self::ToolUse {
                id: str_field("id"),
                name: str_field("name").unwrap_or_default(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            },
            Some("tool_result") => Self::ToolResult {
                tool_use_id: str_field("tool_use_id"),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            Some(other) => Self::Other {
                block_type: other.to_string(),
                raw: value.clone(),
            },
            None => Self::Other {
                block_type: "unknown".to_string(),
                raw: value.clone(),
            },
        }
    }
}

impl From<ContentBlock> for Value {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            ContentBlock::ToolUse { id, name, input } => serde_json::json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
            ContentBlock::Other { raw, .. } => raw,
        }
    }
}

// ── Response ──────────────────────────────────────────────────────

/// Captured response, already folded from the streaming event sequence
/// into a single aggregate body upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl ResponseBody {
    /// Text blocks joined with newlines, skipping empty ones.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Token usage counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Response content that is not a list (error bodies) decodes as empty.
fn lenient_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().map(ContentBlock::from).collect(),
        _ => Vec::new(),
    })
}

// ── Timestamps ────────────────────────────────────────────────────

/// Parse an ISO-8601 timestamp. Offsets are honored; naive timestamps are
/// taken as UTC. Returns `None` for anything unparseable.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
