//! Ingestion layer for indexing transcript files
//!
//! This module keeps the store in step with the log files on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │   Log Files     │ ──► │ IndexCoordinator │ ──► │    Database     │
//! │ (~/.claude/...) │     │                  │     │ (sessions, fts) │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  SessionParser       │
//!                    │  ├─ ClaudeCodeParser │
//!                    │  └─ CodexParser      │
//!                    └──────────────────────┘
//! ```
//!
//! A run rewrites only sessions whose (mtime, size) changed and prunes
//! sessions whose file is gone. Each session is replaced in one transaction,
//! so a failed file leaves its previous version searchable.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ais_core::{Config, Database, IndexCoordinator};
//!
//! # fn main() -> ais_core::Result<()> {
//! let config = Config::load()?;
//! let db = Database::open(&config.database_path())?;
//! db.migrate()?;
//!
//! let stats = IndexCoordinator::new(&db).index_all(&config.source_roots())?;
//! println!("{}", stats);
//! # Ok(())
//! # }
//! ```

pub mod parser;
pub mod parsers;
pub mod timestamp;

pub use parser::{ParseContext, ParseResult, SessionParser};

use crate::config::SourceRoots;
use crate::db::{schema, Database};
use crate::error::Result;
use crate::scan::scan_roots;
use crate::types::{FileDescriptor, FileStamp, IndexStats};
use std::collections::HashSet;
use std::path::Path;

/// What happened to one file during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    /// Session (re)written
    Updated,
    /// Stored stamp matched
    Skipped,
    /// No chunks; not indexed
    Ignored,
    /// Parse or store failure
    Failed,
}

/// Coordinates scanning, parsing and storage for an index run.
pub struct IndexCoordinator<'a> {
    db: &'a Database,
}

impl<'a> IndexCoordinator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Bring the store in line with every log file under `roots`.
    pub fn index_all(&self, roots: &SourceRoots) -> Result<IndexStats> {
        self.index_all_with_progress(roots, |_, _, _| {})
    }

    /// Like [`Self::index_all`], calling `on_progress(current, total, path)`
    /// before each file.
    pub fn index_all_with_progress<F>(
        &self,
        roots: &SourceRoots,
        mut on_progress: F,
    ) -> Result<IndexStats>
    where
        F: FnMut(usize, usize, &Path),
    {
        let forced_reindex = self
            .db
            .ensure_index_version(&schema::current_index_version())?;
        if forced_reindex {
            tracing::info!("Index version changed, every session will be rebuilt");
        }

        let files = scan_roots(roots);
        let total = files.len();
        let mut stats = IndexStats {
            scanned: total,
            forced_reindex,
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::with_capacity(total);

        for (i, file) in files.iter().enumerate() {
            on_progress(i, total, &file.path);

            let root = roots.root_for(file.source).unwrap_or(file.path.as_path());
            match self.index_file(root, file, &mut seen) {
                FileOutcome::Updated => stats.updated += 1,
                FileOutcome::Skipped => stats.skipped += 1,
                FileOutcome::Ignored => {}
                FileOutcome::Failed => stats.errors += 1,
            }
        }

        stats.pruned = self.prune(&seen)?;

        tracing::info!(
            scanned = stats.scanned,
            updated = stats.updated,
            skipped = stats.skipped,
            pruned = stats.pruned,
            errors = stats.errors,
            forced_reindex = stats.forced_reindex,
            "Index run complete"
        );

        Ok(stats)
    }

    /// Parse one file and store it if it changed.
    fn index_file(
        &self,
        root: &Path,
        file: &FileDescriptor,
        seen: &mut HashSet<String>,
    ) -> FileOutcome {
        let ctx = ParseContext {
            path: &file.path,
            root,
            mtime: file.mtime,
            size: file.size,
        };
        let session_key = ctx.session_key(file.source);

        // Marked before parsing so an unreadable file does not prune its session
        seen.insert(session_key.clone());

        let parsed = match parsers::parser_for(file.source).parse(&ctx) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "Failed to parse file");
                return FileOutcome::Failed;
            }
        };

        for warning in &parsed.warnings {
            tracing::debug!(path = %file.path.display(), %warning, "Parse warning");
        }

        if parsed.chunks.is_empty() {
            seen.remove(&session_key);
            tracing::debug!(path = %file.path.display(), "No chunks, ignoring file");
            return FileOutcome::Ignored;
        }

        let current = FileStamp {
            mtime: file.mtime,
            size: file.size,
        };
        match self.db.get_file_stamp(&session_key) {
            Ok(Some(stored)) if stored == current => {
                tracing::debug!(session_key = %session_key, "Unchanged, skipping");
                return FileOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    session_key = %session_key,
                    error = %e,
                    "Failed to read stored stamp"
                );
                return FileOutcome::Failed;
            }
        }

        match self.db.replace_session(&parsed.session, &parsed.chunks) {
            Ok(()) => {
                tracing::debug!(
                    session_key = %session_key,
                    chunks = parsed.chunks.len(),
                    "Indexed session"
                );
                FileOutcome::Updated
            }
            Err(e) => {
                tracing::warn!(session_key = %session_key, error = %e, "Failed to store session");
                FileOutcome::Failed
            }
        }
    }

    /// Delete every stored session not seen this run.
    fn prune(&self, seen: &HashSet<String>) -> Result<usize> {
        let stored = self.db.all_session_keys()?;
        let mut pruned = 0;
        for key in stored.difference(seen) {
            self.db.delete_session(key)?;
            tracing::debug!(session_key = %key, "Pruned session");
            pruned += 1;
        }
        Ok(pruned)
    }
}
