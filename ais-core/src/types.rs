//! Core domain types for ais
//!
//! These types form the normalized model that both transcript formats are
//! reduced to before they reach the store.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Source** | The assistant that wrote a log file (Claude Code or Codex) |
//! | **Session** | One conversation, backed by exactly one log file |
//! | **Chunk** | One indexed unit of text: a prompt, a reply, or a thinking aside |
//! | **Session key** | `"<source>:<path relative to root without .jsonl>"` |
//! | **Stale** | Stored (mtime, size) no longer matches the file on disk |
//! | **Prune** | Removal of a session whose file is no longer discoverable |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================
// Source
// ============================================

/// Which assistant produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Claude Code (`~/.claude/projects/**/*.jsonl`)
    Claude,
    /// OpenAI Codex CLI (`~/.codex/sessions/**/*.jsonl`)
    Codex,
}

impl Source {
    /// All supported sources, in indexing order.
    pub const ALL: [Source; 2] = [Source::Claude, Source::Codex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Claude => "claude",
            Source::Codex => "codex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Claude => "Claude Code",
            Source::Codex => "Codex",
        }
    }

    /// Directory names the scanner never descends into.
    ///
    /// Claude Code writes sub-agent transcripts under `subagents/`; they are
    /// transient work logs, not conversations.
    pub fn excluded_dir_names(&self) -> &'static [&'static str] {
        match self {
            Source::Claude => &["subagents"],
            Source::Codex => &[],
        }
    }

    /// File name fragments marking index artifacts rather than transcripts.
    pub fn excluded_file_fragments(&self) -> &'static [&'static str] {
        match self {
            Source::Claude => &["sessions-index"],
            Source::Codex => &[],
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Source::Claude),
            "codex" => Ok(Source::Codex),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

// ============================================
// Chunk classification
// ============================================

/// Who authored a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Anything else a log calls a role (system, developer, ...)
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other => "other",
        }
    }

    /// Map a role string from a log file. Never fails.
    pub fn from_log(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "other" => Ok(Role::Other),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Whether a chunk is visible output or a reasoning aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    #[default]
    Text,
    Thinking,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Thinking => "thinking",
        }
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ChunkKind::Text),
            "thinking" => Ok(ChunkKind::Thinking),
            _ => Err(format!("unknown chunk kind: {}", s)),
        }
    }
}

// ============================================
// Discovery
// ============================================

/// A candidate log file found by the scanner. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Which parser handles it
    pub source: Source,
    /// Modification time, whole seconds since the Unix epoch
    pub mtime: i64,
    /// Size in bytes
    pub size: i64,
}

// ============================================
// Sessions and chunks
// ============================================

/// One indexed conversation, backed by one log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// `"<source>:<relative path without .jsonl>"`
    pub session_key: String,
    pub source: Source,
    pub file_path: PathBuf,
    /// Working directory the assistant ran in; empty when unknown
    pub cwd: String,
    /// Timestamp of the first chunk-producing record (`None` = zero)
    pub created_at: Option<DateTime<Utc>>,
    /// Timestamp of the last chunk-producing record (`None` = zero)
    pub updated_at: Option<DateTime<Utc>>,
    pub summary: String,
    /// File mtime (seconds) when the session was indexed
    pub mtime: i64,
    /// File size (bytes) when the session was indexed
    pub size: i64,
}

/// One unit of indexed text within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub session_key: String,
    /// 0-based position within the session, contiguous
    pub chunk_id: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub role: Role,
    pub kind: ChunkKind,
    /// Text, already truncated to the chunk ceiling
    pub text: String,
    /// 1-based line in the source file
    pub line_number: i64,
}

/// (mtime, size) pair used for staleness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime: i64,
    pub size: i64,
}

// ============================================
// Read-side results
// ============================================

/// A search or listing hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub session_key: String,
    /// Matching chunk; `None` for session listings
    pub chunk_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source: Source,
    pub cwd: String,
    pub summary: String,
    /// Excerpt with the match wrapped in `>>>` / `<<<`
    pub snippet: String,
    /// Role of the matching chunk; `None` for session listings
    pub role: Option<Role>,
    /// Lower is more relevant; substring matches always rank 0
    pub rank: f64,
}

/// A bounded slice of a session's chunks around a hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkWindow {
    pub chunks: Vec<Chunk>,
    /// Index of the hit chunk within `chunks`, if it was found
    pub hit_index: Option<usize>,
    /// Number of chunks before the window
    pub start_offset: usize,
    /// Total chunks in the session
    pub total: usize,
}

/// Row counts used by `ais doctor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sessions: i64,
    pub chunks: i64,
    pub fts_rows: i64,
}

impl StoreStats {
    /// The FTS mirror holds exactly one row per chunk.
    pub fn fts_in_sync(&self) -> bool {
        self.chunks == self.fts_rows
    }
}

// ============================================
// Index run statistics
// ============================================

/// Counters for one indexing run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Files found by the scanner
    pub scanned: usize,
    /// Sessions (re)written
    pub updated: usize,
    /// Files whose (mtime, size) matched the store
    pub skipped: usize,
    /// Sessions removed because their file disappeared
    pub pruned: usize,
    /// Files that failed to parse or store
    pub errors: usize,
    /// Whether an index-version change reset every stored stamp
    pub forced_reindex: bool,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} updated={} skipped={} pruned={} errors={}",
            self.scanned, self.updated, self.skipped, self.pruned, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("aider".parse::<Source>().is_err());
    }

    #[test]
    fn test_role_from_log_never_fails() {
        assert_eq!(Role::from_log("user"), Role::User);
        assert_eq!(Role::from_log("assistant"), Role::Assistant);
        assert_eq!(Role::from_log("developer"), Role::Other);
        assert_eq!(Role::from_log(""), Role::Other);
    }

    #[test]
    fn test_exclusions_only_apply_to_claude() {
        assert_eq!(Source::Claude.excluded_dir_names(), &["subagents"]);
        assert!(Source::Codex.excluded_dir_names().is_empty());
        assert!(Source::Codex.excluded_file_fragments().is_empty());
    }

    #[test]
    fn test_index_stats_display() {
        let stats = IndexStats {
            scanned: 4,
            updated: 2,
            skipped: 1,
            pruned: 0,
            errors: 1,
            forced_reindex: false,
        };
        assert_eq!(
            stats.to_string(),
            "scanned=4 updated=2 skipped=1 pruned=0 errors=1"
        );
    }

    #[test]
    fn test_store_stats_sync() {
        let stats = StoreStats {
            sessions: 1,
            chunks: 3,
            fts_rows: 3,
        };
        assert!(stats.fts_in_sync());
        assert!(!StoreStats { fts_rows: 2, ..stats }.fts_in_sync());
    }
}
