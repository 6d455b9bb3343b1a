//! OpenAI Codex CLI JSONL parser
//!
//! Parses session logs from `~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`.
//!
//! Each line is a `{timestamp, type, payload}` envelope. Three envelope types
//! matter:
//!
//! - **`session_meta`** names the working directory. Unlike Claude logs, a
//!   later `session_meta` overwrites an earlier one.
//! - **`event_msg`** carries user prompts (`user_message`) and reasoning
//!   summaries (`agent_reasoning`).
//! - **`response_item`** carries model-visible messages; only `message`
//!   items with text blocks become chunks.
//!
//! # Error Handling
//!
//! Malformed lines and payloads are recorded in [`ParseResult::warnings`] and
//! skipped; the rest of the file is still indexed.

use crate::error::Result;
use crate::ingest::parser::{
    open_lines, read_error, LogLine, ParseContext, ParseResult, SessionBuilder, SessionParser,
};
use crate::ingest::timestamp::parse_timestamp;
use crate::types::{ChunkKind, Role, Source};
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Parser for OpenAI Codex CLI JSONL logs.
#[derive(Debug, Default)]
pub struct CodexParser;

impl CodexParser {
    pub fn new() -> Self {
        Self
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Top-level event container for Codex JSONL records.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawEvent {
    timestamp: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    payload: serde_json::Value,
}

/// Session metadata payload.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SessionMetaPayload {
    cwd: Option<String>,
}

/// `event_msg` payload subtypes.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventMsg {
    UserMessage {
        #[serde(default)]
        message: Option<String>,
    },
    AgentReasoning {
        #[serde(default)]
        text: Option<String>,
    },
    // token_count, agent_message, turn_aborted, ...
    #[serde(other)]
    Other,
}

/// `response_item` payload subtypes.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseItem {
    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Option<Vec<BlockSlot>>,
    },
    // reasoning, function_call, function_call_output, ...
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlockSlot {
    Known(ContentBlock),
    Unknown(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "input_text")]
    InputText {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "output_text")]
    OutputText {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    fn into_text(self) -> Option<String> {
        match self {
            ContentBlock::InputText { text }
            | ContentBlock::OutputText { text }
            | ContentBlock::Text { text } => Some(text).filter(|t| !t.is_empty()),
            ContentBlock::Unknown => None,
        }
    }
}

/// Classified record.
#[derive(Debug)]
enum Record {
    SessionMeta { cwd: String },
    Event(EventMsg),
    Response(ResponseItem),
    Other,
}

impl Record {
    /// Classify an envelope. `Err` carries a description of a bad payload.
    fn classify(event: RawEvent) -> std::result::Result<Self, String> {
        let payload = event.payload;
        match event.event_type.as_deref() {
            Some("session_meta") => serde_json::from_value::<SessionMetaPayload>(payload)
                .map(|meta| Record::SessionMeta {
                    cwd: meta.cwd.unwrap_or_default(),
                })
                .map_err(|e| format!("session_meta payload: {}", e)),
            Some("event_msg") => serde_json::from_value(payload)
                .map(Record::Event)
                .map_err(|e| format!("event_msg payload: {}", e)),
            Some("response_item") => serde_json::from_value(payload)
                .map(Record::Response)
                .map_err(|e| format!("response_item payload: {}", e)),
            _ => Ok(Record::Other),
        }
    }
}

/// A chunk-producing record reduced to (role, kind, text).
fn chunk_parts(record: Record) -> Option<(Role, ChunkKind, String)> {
    match record {
        Record::Event(EventMsg::UserMessage { message }) => {
            Some((Role::User, ChunkKind::Text, message.unwrap_or_default()))
        }
        Record::Event(EventMsg::AgentReasoning { text }) => {
            Some((Role::Assistant, ChunkKind::Thinking, text.unwrap_or_default()))
        }
        Record::Response(ResponseItem::Message { role, content }) => {
            let role = role
                .as_deref()
                .filter(|r| !r.is_empty())
                .map(Role::from_log)
                .unwrap_or(Role::Assistant);
            let text = content
                .unwrap_or_default()
                .into_iter()
                .filter_map(|slot| match slot {
                    BlockSlot::Known(block) => block.into_text(),
                    BlockSlot::Unknown(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            Some((role, ChunkKind::Text, text))
        }
        _ => None,
    }
}

impl SessionParser for CodexParser {
    fn source(&self) -> Source {
        Source::Codex
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseResult> {
        let mut builder = SessionBuilder::new(ctx.session_key(Source::Codex), Source::Codex);
        let mut warnings = Vec::new();
        let mut last_line = 0;

        for item in open_lines(ctx)? {
            let (line_number, line) =
                item.map_err(|e| read_error(Source::Codex, ctx.path, last_line, e))?;
            last_line = line_number;

            let line = match line {
                LogLine::Text(line) => line,
                LogLine::Oversized { bytes } => {
                    warnings.push(format!(
                        "Line {}: {} bytes exceeds line limit, skipped",
                        line_number, bytes
                    ));
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let event: RawEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    warnings.push(format!("Line {}: JSON parse error: {}", line_number, e));
                    continue;
                }
            };
            let ts = parse_timestamp(event.timestamp.as_deref().unwrap_or(""));

            let record = match Record::classify(event) {
                Ok(record) => record,
                Err(message) => {
                    warnings.push(format!("Line {}: {}", line_number, message));
                    continue;
                }
            };

            if let Record::SessionMeta { cwd } = &record {
                builder.replace_cwd(cwd);
                continue;
            }

            let Some((role, kind, text)) = chunk_parts(record) else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            builder.touch(ts);
            builder.push(ts, role, kind, text, line_number);
        }

        if !warnings.is_empty() {
            tracing::debug!(
                path = %ctx.path.display(),
                warnings = warnings.len(),
                "Skipped malformed lines"
            );
        }

        Ok(builder.finish(ctx, warnings))
    }
}
