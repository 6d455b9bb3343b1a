//! Parser trait abstraction
//!
//! All transcript parsers implement the [`SessionParser`] trait and turn one
//! log file into a [`SessionRecord`] plus its ordered [`Chunk`]s.
//!
//! ## Design Principles
//!
//! 1. **Pure**: parsing reads one file and never touches the store
//! 2. **Resilience**: a bad line is skipped and recorded as a warning
//! 3. **Bounded**: lines and chunk text have hard size ceilings

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkKind, Role, SessionRecord, Source};
use chrono::{DateTime, Utc};
use std::io::{self, BufRead};
use std::path::Path;

/// Longest line a parser will decode. Longer lines are consumed and skipped.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Chunk text is truncated to this many bytes before storage.
pub const MAX_CHUNK_BYTES: usize = 8 * 1024;

/// Fallback summaries keep this many characters of the first chunk.
pub const SUMMARY_CHARS: usize = 200;

/// Context passed to a parser: the file and where it was found.
pub struct ParseContext<'a> {
    /// Path to the log file
    pub path: &'a Path,
    /// Root the file was discovered under (used for the session key)
    pub root: &'a Path,
    /// Modification time recorded by the scanner
    pub mtime: i64,
    /// Size recorded by the scanner
    pub size: i64,
}

impl ParseContext<'_> {
    /// Session key for this file under `source`.
    pub fn session_key(&self, source: Source) -> String {
        session_key_for(source, self.root, self.path)
    }
}

/// Result of parsing one log file.
#[derive(Debug)]
pub struct ParseResult {
    pub session: SessionRecord,
    /// Chunks in file order, ids contiguous from 0
    pub chunks: Vec<Chunk>,
    /// Lines that were skipped, with the reason (non-fatal)
    pub warnings: Vec<String>,
}

/// Trait implemented by all transcript parsers.
///
/// ## Error Handling
///
/// - Malformed lines and payloads are added to `ParseResult::warnings`
/// - Only whole-file failures (cannot open, read error) return `Err`
pub trait SessionParser: Send + Sync {
    /// Which source this parser handles
    fn source(&self) -> Source;

    /// Parse a whole log file.
    fn parse(&self, ctx: &ParseContext) -> Result<ParseResult>;
}

/// `"<source>:<path relative to root, without .jsonl>"`.
///
/// A path outside `root` keys on its full path.
pub fn session_key_for(source: Source, root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.to_string_lossy();
    let rel = rel.strip_suffix(".jsonl").unwrap_or(&rel);
    format!("{}:{}", source.as_str(), rel)
}

/// Cut `text` to at most `max_bytes`, backing off to a character boundary.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// First `SUMMARY_CHARS` characters with newlines flattened to spaces.
pub fn summarize(text: &str) -> String {
    text.chars()
        .take(SUMMARY_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

// ============================================
// Bounded line reading
// ============================================

/// One physical line of a log file.
#[derive(Debug, PartialEq, Eq)]
pub enum LogLine {
    /// Line content without the terminator
    Text(String),
    /// Line longer than the ceiling; content was discarded
    Oversized { bytes: usize },
}

/// Line iterator that never buffers more than `max_bytes` of one line.
///
/// Yields `(line_number, line)` with 1-based numbers counting every physical
/// line, blank and oversized lines included.
pub struct BoundedLines<R> {
    reader: R,
    max_bytes: usize,
    line_number: i64,
    buf: Vec<u8>,
}

impl<R: BufRead> BoundedLines<R> {
    pub fn new(reader: R, max_bytes: usize) -> Self {
        Self {
            reader,
            max_bytes,
            line_number: 0,
            buf: Vec::new(),
        }
    }

    fn read_line(&mut self) -> io::Result<Option<LogLine>> {
        self.buf.clear();
        let mut total = 0usize;
        let mut oversized = false;
        let mut saw_bytes = false;

        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            saw_bytes = true;

            let (consumed, content, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, i, true),
                None => (available.len(), available.len(), false),
            };

            total += content;
            if !oversized {
                if total > self.max_bytes {
                    oversized = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&available[..content]);
                }
            }

            self.reader.consume(consumed);
            if done {
                break;
            }
        }

        if !saw_bytes {
            return Ok(None);
        }
        if oversized {
            return Ok(Some(LogLine::Oversized { bytes: total }));
        }

        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(LogLine::Text(
            String::from_utf8_lossy(&self.buf).into_owned(),
        )))
    }
}

impl<R: BufRead> Iterator for BoundedLines<R> {
    type Item = io::Result<(i64, LogLine)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_line() {
            Ok(Some(line)) => {
                self.line_number += 1;
                Some(Ok((self.line_number, line)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Open `ctx.path` and iterate its lines under the line ceiling.
pub fn open_lines(ctx: &ParseContext) -> Result<BoundedLines<io::BufReader<std::fs::File>>> {
    let file = std::fs::File::open(ctx.path).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", ctx.path.display(), e),
        ))
    })?;
    Ok(BoundedLines::new(io::BufReader::new(file), MAX_LINE_BYTES))
}

/// Map a mid-file read failure to a whole-file parse error.
pub fn read_error(source: Source, path: &Path, line: i64, err: io::Error) -> Error {
    Error::Parse {
        format: source.as_str().to_string(),
        message: format!("{}: read error after line {}: {}", path.display(), line, err),
    }
}

// ============================================
// Session accumulation
// ============================================

/// Accumulates chunks and session metadata while a file is read.
pub struct SessionBuilder {
    session_key: String,
    source: Source,
    cwd: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    explicit_summary: Option<String>,
    chunks: Vec<Chunk>,
}

impl SessionBuilder {
    pub fn new(session_key: String, source: Source) -> Self {
        Self {
            session_key,
            source,
            cwd: String::new(),
            created_at: None,
            updated_at: None,
            explicit_summary: None,
            chunks: Vec::new(),
        }
    }

    /// Set the working directory unless one is already known.
    pub fn offer_cwd(&mut self, cwd: &str) {
        if self.cwd.is_empty() && !cwd.is_empty() {
            self.cwd = cwd.to_string();
        }
    }

    /// Overwrite the working directory.
    pub fn replace_cwd(&mut self, cwd: &str) {
        self.cwd = cwd.to_string();
    }

    /// Record an explicit summary; later ones win.
    pub fn set_summary(&mut self, summary: &str) {
        self.explicit_summary = Some(summary.to_string());
    }

    /// Note a chunk-producing record.
    ///
    /// created-at keeps the first non-zero timestamp, updated-at the last one
    /// seen, zero included.
    pub fn touch(&mut self, timestamp: Option<DateTime<Utc>>) {
        if self.created_at.is_none() {
            self.created_at = timestamp;
        }
        self.updated_at = timestamp;
    }

    /// Append a chunk. Empty text is ignored; long text is truncated.
    pub fn push(
        &mut self,
        timestamp: Option<DateTime<Utc>>,
        role: Role,
        kind: ChunkKind,
        text: &str,
        line_number: i64,
    ) {
        if text.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            session_key: self.session_key.clone(),
            chunk_id: self.chunks.len() as i64,
            timestamp,
            role,
            kind,
            text: truncate_utf8(text, MAX_CHUNK_BYTES).to_string(),
            line_number,
        });
    }

    /// Build the session record and hand over the chunks.
    pub fn finish(self, ctx: &ParseContext, warnings: Vec<String>) -> ParseResult {
        let summary = match self.explicit_summary {
            Some(summary) => summary,
            None => self
                .chunks
                .first()
                .map(|c| summarize(&c.text))
                .unwrap_or_default(),
        };

        ParseResult {
            session: SessionRecord {
                session_key: self.session_key,
                source: self.source,
                file_path: ctx.path.to_path_buf(),
                cwd: self.cwd,
                created_at: self.created_at,
                updated_at: self.updated_at,
                summary,
                mtime: ctx.mtime,
                size: ctx.size,
            },
            chunks: self.chunks,
            warnings,
        }
    }
}
