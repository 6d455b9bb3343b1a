//! Claude Code JSONL parser
//!
//! Parses session logs from `~/.claude/projects/[encoded-path]/*.jsonl`.
//!
//! # Record handling
//!
//! Every line is decoded into a loose [`RawRecord`] envelope and then
//! classified into a [`Record`]:
//!
//! - **`summary`** records carry an explicit session summary. The last one
//!   wins over the first-chunk fallback.
//! - **`user` / `assistant`** records become chunks. A record may yield a
//!   `thinking` chunk followed by a `text` chunk.
//! - Everything else (meta records, snapshots, system records) produces no
//!   chunk but may still supply the working directory.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines**: recorded in [`ParseResult::warnings`], skipped.
//! - **Malformed `message` payloads**: recorded, skipped.
//! - **Unknown content blocks**: ignored individually; the rest of the
//!   record is still used.

use crate::error::Result;
use crate::ingest::parser::{
    open_lines, read_error, LogLine, ParseContext, ParseResult, SessionBuilder, SessionParser,
};
use crate::ingest::timestamp::parse_timestamp;
use crate::types::{ChunkKind, Role, Source};
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Parser for Claude Code JSONL logs.
#[derive(Debug, Default)]
pub struct ClaudeCodeParser;

impl ClaudeCodeParser {
    pub fn new() -> Self {
        Self
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from Claude Code JSONL.
///
/// Uses `#[serde(default)]` and `Option` so missing or null fields never fail
/// the line.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    is_meta: Option<bool>,
    timestamp: Option<String>,
    cwd: Option<String>,
    summary: Option<String>,
    /// Decoded separately so a bad payload only costs this record
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: MessageContent,
}

/// `message.content`: a plain string or a list of typed blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    PlainText(String),
    Blocks(Vec<BlockSlot>),
    Unrecognized(IgnoredAny),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Unrecognized(IgnoredAny)
    }
}

/// One entry of a block list. Anything that is not a well-formed known
/// block lands in `Unknown` instead of failing the whole list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlockSlot {
    Known(ContentBlock),
    Unknown(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        text: String,
    },
    // Catch-all for tool_use, tool_result, image, ...
    #[serde(other)]
    Unknown,
}

/// Classified record.
#[derive(Debug)]
enum Record {
    Summary(String),
    Message {
        role: Role,
        timestamp: String,
        message: serde_json::Value,
    },
    Other,
}

impl Record {
    fn classify(raw: RawRecord) -> Self {
        let record_type = raw.record_type.unwrap_or_default();
        let summary = raw.summary.unwrap_or_default();
        match record_type.as_str() {
            "summary" if !summary.is_empty() => Record::Summary(summary),
            "user" | "assistant" if !raw.is_meta.unwrap_or(false) => match raw.message {
                Some(message) => Record::Message {
                    role: Role::from_log(&record_type),
                    timestamp: raw.timestamp.unwrap_or_default(),
                    message,
                },
                None => Record::Other,
            },
            _ => Record::Other,
        }
    }

    /// Summary records never contribute a working directory.
    fn is_summary(raw: &RawRecord) -> bool {
        raw.record_type.as_deref() == Some("summary")
            && raw.summary.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Text pulled out of one message.
#[derive(Debug, Default, PartialEq, Eq)]
struct ExtractedContent {
    thinking: String,
    text: String,
}

fn extract_content(content: MessageContent) -> ExtractedContent {
    match content {
        MessageContent::PlainText(s) => ExtractedContent {
            thinking: String::new(),
            text: s.trim().to_string(),
        },
        MessageContent::Blocks(blocks) => {
            let mut thinking_parts = Vec::new();
            let mut text_parts = Vec::new();
            for slot in blocks {
                match slot {
                    BlockSlot::Known(ContentBlock::Thinking { thinking, text }) => {
                        let part = if thinking.is_empty() { text } else { thinking };
                        if !part.is_empty() {
                            thinking_parts.push(part);
                        }
                    }
                    BlockSlot::Known(ContentBlock::Text { text }) if !text.is_empty() => {
                        text_parts.push(text);
                    }
                    _ => {}
                }
            }
            ExtractedContent {
                thinking: thinking_parts.join("\n").trim().to_string(),
                text: text_parts.join("\n").trim().to_string(),
            }
        }
        MessageContent::Unrecognized(_) => ExtractedContent::default(),
    }
}

impl SessionParser for ClaudeCodeParser {
    fn source(&self) -> Source {
        Source::Claude
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseResult> {
        let mut builder = SessionBuilder::new(ctx.session_key(Source::Claude), Source::Claude);
        let mut warnings = Vec::new();
        let mut last_line = 0;

        for item in open_lines(ctx)? {
            let (line_number, line) =
                item.map_err(|e| read_error(Source::Claude, ctx.path, last_line, e))?;
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

            let raw: RawRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warnings.push(format!("Line {}: JSON parse error: {}", line_number, e));
                    continue;
                }
            };

            // Any other record may name the working directory, meta included
            if !Record::is_summary(&raw) {
                if let Some(cwd) = raw.cwd.as_deref() {
                    builder.offer_cwd(cwd);
                }
            }

            let (role, timestamp, message) = match Record::classify(raw) {
                Record::Summary(summary) => {
                    builder.set_summary(&summary);
                    continue;
                }
                Record::Message {
                    role,
                    timestamp,
                    message,
                } => (role, timestamp, message),
                Record::Other => continue,
            };

            let message: RawMessage = match serde_json::from_value(message) {
                Ok(m) => m,
                Err(e) => {
                    warnings.push(format!(
                        "Line {}: malformed message payload: {}",
                        line_number, e
                    ));
                    continue;
                }
            };

            let content = extract_content(message.content);
            if content.thinking.is_empty() && content.text.is_empty() {
                continue;
            }

            let ts = parse_timestamp(&timestamp);
            builder.touch(ts);
            builder.push(ts, role, ChunkKind::Thinking, &content.thinking, line_number);
            builder.push(ts, role, ChunkKind::Text, &content.text, line_number);
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
