//! Database repository layer
//!
//! Typed reads and writes over the session and chunk tables. Every write that
//! touches more than one row runs in a single transaction.

use super::schema;
use crate::error::{Error, Result};
use crate::ingest::timestamp::{format_timestamp, parse_timestamp};
use crate::types::*;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Busy timeout applied when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create a database, waiting up to `busy_timeout` on a locked store
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets readers see the last commit while an index pass writes
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        tracing::debug!(path = %path.display(), ?busy_timeout, "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Index version
    // ============================================

    /// Force a full re-index when the stored marker differs from `target`.
    ///
    /// Returns whether stored stamps were reset.
    pub fn ensure_index_version(&self, target: &str) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        schema::migrate_index_version(&mut conn, target)
    }

    // ============================================
    // Session operations
    // ============================================

    /// Stored (mtime, size) for a session, if it is indexed
    pub fn get_file_stamp(&self, session_key: &str) -> Result<Option<FileStamp>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT mtime, size FROM sessions WHERE session_key = ?",
            [session_key],
            |row| {
                Ok(FileStamp {
                    mtime: row.get(0)?,
                    size: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Replace a session and all of its chunks.
    ///
    /// Old chunks and the old row are deleted and the new ones inserted in one
    /// transaction; on failure the previous data is left untouched.
    pub fn replace_session(&self, session: &SessionRecord, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        delete_session_rows(&tx, &session.session_key)?;

        tx.execute(
            r#"
            INSERT INTO sessions (session_key, source, file_path, cwd, created_at,
                                  updated_at, summary, mtime, size)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                session.session_key,
                session.source.as_str(),
                session.file_path.to_string_lossy(),
                session.cwd,
                format_timestamp(session.created_at),
                format_timestamp(session.updated_at),
                session.summary,
                session.mtime,
                session.size,
            ],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO chunks (session_key, chunk_id, ts, role, kind, text, line_number)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    session.session_key,
                    chunk.chunk_id,
                    format_timestamp(chunk.timestamp),
                    chunk.role.as_str(),
                    chunk.kind.as_str(),
                    chunk.text,
                    chunk.line_number,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a session and its chunks. Returns whether the session existed.
    pub fn delete_session(&self, session_key: &str) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let removed = delete_session_rows(&tx, session_key)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Every indexed session key
    pub fn all_session_keys(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT session_key FROM sessions")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(keys)
    }

    /// Get a session by key
    pub fn get_session_by_key(&self, session_key: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM sessions WHERE session_key = ?",
            [session_key],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List sessions newest first. `limit` of 0 means no limit.
    ///
    /// The role filter does not apply to sessions and is ignored.
    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
        limit: usize,
    ) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            params.push(Box::new(source.as_str().to_string()));
        }

        if let Some(since) = &filter.since {
            sql.push_str(" AND updated_at >= ?");
            params.push(Box::new(since_bound(since)));
        }

        sql.push_str(" ORDER BY updated_at DESC, session_key ASC");

        if limit > 0 {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_refs.as_slice(), Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    pub(crate) fn row_to_session(row: &Row) -> rusqlite::Result<SessionRecord> {
        let source_str: String = row.get("source")?;
        let file_path: String = row.get("file_path")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(SessionRecord {
            session_key: row.get("session_key")?,
            source: source_str.parse().unwrap_or(Source::Claude),
            file_path: PathBuf::from(file_path),
            cwd: row.get("cwd")?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            summary: row.get("summary")?,
            mtime: row.get("mtime")?,
            size: row.get("size")?,
        })
    }

    // ============================================
    // Chunk operations
    // ============================================

    /// All chunks of a session in chunk-id order
    pub fn get_chunks(&self, session_key: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        query_chunks(&conn, session_key, None)
    }

    /// Chunks within `radius` of `hit`, clipped to the session.
    ///
    /// With no hit, or a hit id the session does not contain, the whole
    /// session is returned and `hit_index` is `None`.
    pub fn get_chunks_window(
        &self,
        session_key: &str,
        hit: Option<i64>,
        radius: usize,
    ) -> Result<ChunkWindow> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE session_key = ?",
            [session_key],
            |r| r.get(0),
        )?;
        let total = total as usize;

        let position: Option<i64> = match hit {
            Some(chunk_id) => conn
                .query_row(
                    r#"
                    SELECT pos FROM (
                        SELECT chunk_id, ROW_NUMBER() OVER (ORDER BY chunk_id) - 1 AS pos
                        FROM chunks
                        WHERE session_key = ?1
                    )
                    WHERE chunk_id = ?2
                    "#,
                    params![session_key, chunk_id],
                    |r| r.get(0),
                )
                .optional()?,
            None => None,
        };

        let Some(position) = position else {
            return Ok(ChunkWindow {
                chunks: query_chunks(&conn, session_key, None)?,
                hit_index: None,
                start_offset: 0,
                total,
            });
        };

        let position = position as usize;
        let start = position.saturating_sub(radius);
        let end = position.saturating_add(radius).saturating_add(1).min(total);
        let chunks = query_chunks(&conn, session_key, Some((start, end - start)))?;

        Ok(ChunkWindow {
            chunks,
            hit_index: Some(position - start),
            start_offset: start,
            total,
        })
    }

    pub(crate) fn row_to_chunk(row: &Row) -> rusqlite::Result<Chunk> {
        let ts: String = row.get("ts")?;
        let role: String = row.get("role")?;
        let kind: String = row.get("kind")?;

        Ok(Chunk {
            session_key: row.get("session_key")?,
            chunk_id: row.get("chunk_id")?,
            timestamp: parse_timestamp(&ts),
            role: role.parse().unwrap_or(Role::Other),
            kind: kind.parse().unwrap_or_default(),
            text: row.get("text")?,
            line_number: row.get("line_number")?,
        })
    }

    // ========== Diagnostics ==========

    /// Row counts for sessions, chunks and the full-text index
    pub fn store_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

        Ok(StoreStats {
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            chunks: count("SELECT COUNT(*) FROM chunks")?,
            // One docsize row per document the FTS index actually holds
            fts_rows: count("SELECT COUNT(*) FROM chunks_fts_docsize")?,
        })
    }

    /// Get the database file size in bytes.
    pub fn get_database_size(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();

        let page_count: u64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: u64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(page_count * page_size)
    }
}

/// Delete chunks then the session row. Returns whether the row existed.
fn delete_session_rows(conn: &Connection, session_key: &str) -> Result<bool> {
    conn.execute("DELETE FROM chunks WHERE session_key = ?", [session_key])?;
    let removed = conn.execute("DELETE FROM sessions WHERE session_key = ?", [session_key])?;
    Ok(removed > 0)
}

/// Chunks of a session, optionally limited to `(offset, count)`.
fn query_chunks(
    conn: &Connection,
    session_key: &str,
    range: Option<(usize, usize)>,
) -> Result<Vec<Chunk>> {
    let (offset, count) = match range {
        Some((offset, count)) => (offset as i64, count as i64),
        None => (0, -1),
    };

    let mut stmt = conn.prepare_cached(
        r#"
        SELECT * FROM chunks
        WHERE session_key = ?1
        ORDER BY chunk_id ASC
        LIMIT ?2 OFFSET ?3
        "#,
    )?;
    let chunks = stmt
        .query_map(params![session_key, count, offset], Database::row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(chunks)
}

/// Lower bound for an updated-since filter, comparable with stored ISO text.
pub(crate) fn since_bound(since: &NaiveDate) -> String {
    since.format("%Y-%m-%d").to_string()
}

/// Filter shared by search and session listing
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions from this source
    pub source: Option<Source>,
    /// Only chunks with this role (search only)
    pub role: Option<Role>,
    /// Only sessions updated on or after this date
    pub since: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn create_test_session(key: &str, source: Source, day: u32) -> SessionRecord {
        let ts = Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        SessionRecord {
            session_key: key.to_string(),
            source,
            file_path: PathBuf::from(format!("/logs/{}.jsonl", key)),
            cwd: "/home/me/proj".to_string(),
            created_at: Some(ts),
            updated_at: Some(ts),
            summary: "a session".to_string(),
            mtime: 1000,
            size: 42,
        }
    }

    fn create_test_chunks(key: &str, texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                session_key: key.to_string(),
                chunk_id: i as i64,
                timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, i as u32).unwrap()),
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                kind: ChunkKind::Text,
                text: text.to_string(),
                line_number: (i + 1) as i64,
            })
            .collect()
    }

    #[test]
    fn test_replace_and_read_back() {
        let db = test_db();
        let session = create_test_session("claude:p/a", Source::Claude, 2);
        let chunks = create_test_chunks("claude:p/a", &["one", "two", "three"]);

        db.replace_session(&session, &chunks).unwrap();

        assert_eq!(db.get_session_by_key("claude:p/a").unwrap(), Some(session));
        assert_eq!(db.get_chunks("claude:p/a").unwrap(), chunks);
        assert_eq!(
            db.get_file_stamp("claude:p/a").unwrap(),
            Some(FileStamp {
                mtime: 1000,
                size: 42
            })
        );
        assert_eq!(db.get_file_stamp("claude:missing").unwrap(), None);
    }

    #[test]
    fn test_replace_leaves_no_orphans() {
        let db = test_db();
        let session = create_test_session("codex:r", Source::Codex, 2);
        db.replace_session(&session, &create_test_chunks("codex:r", &["a", "b", "c", "d"]))
            .unwrap();

        let shorter = create_test_chunks("codex:r", &["x"]);
        db.replace_session(&session, &shorter).unwrap();

        assert_eq!(db.get_chunks("codex:r").unwrap(), shorter);
        let stats = db.store_stats().unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.chunks, 1);
        assert!(stats.fts_in_sync());
    }

    #[test]
    fn test_zero_timestamps_round_trip() {
        let db = test_db();
        let mut session = create_test_session("claude:z", Source::Claude, 2);
        session.created_at = None;
        session.updated_at = None;
        let mut chunks = create_test_chunks("claude:z", &["no time"]);
        chunks[0].timestamp = None;

        db.replace_session(&session, &chunks).unwrap();

        let stored = db.get_session_by_key("claude:z").unwrap().unwrap();
        assert_eq!(stored.updated_at, None);
        assert_eq!(db.get_chunks("claude:z").unwrap()[0].timestamp, None);
    }

    #[test]
    fn test_delete_session() {
        let db = test_db();
        let session = create_test_session("claude:d", Source::Claude, 2);
        db.replace_session(&session, &create_test_chunks("claude:d", &["x", "y"]))
            .unwrap();

        assert!(db.delete_session("claude:d").unwrap());
        assert!(!db.delete_session("claude:d").unwrap());
        assert_eq!(db.get_session_by_key("claude:d").unwrap(), None);
        assert!(db.get_chunks("claude:d").unwrap().is_empty());
        assert_eq!(db.store_stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_all_session_keys() {
        let db = test_db();
        for key in ["claude:a", "codex:b"] {
            db.replace_session(&create_test_session(key, Source::Claude, 2), &[])
                .unwrap();
        }
        let keys = db.all_session_keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("codex:b"));
    }

    #[test]
    fn test_list_sessions_filter_and_order() {
        let db = test_db();
        db.replace_session(&create_test_session("claude:old", Source::Claude, 1), &[])
            .unwrap();
        db.replace_session(&create_test_session("claude:new", Source::Claude, 20), &[])
            .unwrap();
        db.replace_session(&create_test_session("codex:mid", Source::Codex, 10), &[])
            .unwrap();

        let all = db.list_sessions(&SessionFilter::default(), 0).unwrap();
        let keys: Vec<_> = all.iter().map(|s| s.session_key.as_str()).collect();
        assert_eq!(keys, vec!["claude:new", "codex:mid", "claude:old"]);

        let filter = SessionFilter {
            source: Some(Source::Claude),
            since: NaiveDate::from_ymd_opt(2025, 1, 5),
            ..Default::default()
        };
        let filtered = db.list_sessions(&filter, 0).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].session_key, "claude:new");

        assert_eq!(db.list_sessions(&SessionFilter::default(), 2).unwrap().len(), 2);
    }

    #[test]
    fn test_chunk_window_around_hit() {
        let db = test_db();
        let texts = ["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9"];
        db.replace_session(
            &create_test_session("claude:w", Source::Claude, 2),
            &create_test_chunks("claude:w", &texts),
        )
        .unwrap();

        let window = db.get_chunks_window("claude:w", Some(5), 2).unwrap();
        let ids: Vec<_> = window.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6, 7]);
        assert_eq!(window.hit_index, Some(2));
        assert_eq!(window.start_offset, 3);
        assert_eq!(window.total, 10);

        // Clipped at the start
        let window = db.get_chunks_window("claude:w", Some(1), 3).unwrap();
        let ids: Vec<_> = window.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(window.hit_index, Some(1));

        // Clipped at the end
        let window = db.get_chunks_window("claude:w", Some(9), 2).unwrap();
        let ids: Vec<_> = window.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
        assert_eq!(window.hit_index, Some(2));
    }

    #[test]
    fn test_chunk_window_without_hit() {
        let db = test_db();
        db.replace_session(
            &create_test_session("claude:w", Source::Claude, 2),
            &create_test_chunks("claude:w", &["a", "b", "c"]),
        )
        .unwrap();

        let whole = db.get_chunks_window("claude:w", None, 1).unwrap();
        assert_eq!(whole.chunks.len(), 3);
        assert_eq!(whole.hit_index, None);

        let missing = db.get_chunks_window("claude:w", Some(99), 1).unwrap();
        assert_eq!(missing.chunks.len(), 3);
        assert_eq!(missing.hit_index, None);
        assert_eq!(missing.start_offset, 0);

        let empty = db.get_chunks_window("claude:none", Some(0), 1).unwrap();
        assert!(empty.chunks.is_empty());
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn test_chunk_window_huge_radius_keeps_hit() {
        let db = test_db();
        db.replace_session(
            &create_test_session("claude:w", Source::Claude, 2),
            &create_test_chunks("claude:w", &["c0", "c1", "c2", "c3", "c4"]),
        )
        .unwrap();

        let window = db.get_chunks_window("claude:w", Some(2), usize::MAX).unwrap();
        let ids: Vec<_> = window.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(window.hit_index, Some(2));
        assert_eq!(window.start_offset, 0);
    }

    #[test]
    fn test_list_sessions_huge_limit() {
        let db = test_db();
        db.replace_session(&create_test_session("claude:a", Source::Claude, 2), &[])
            .unwrap();

        let all = db
            .list_sessions(&SessionFilter::default(), usize::MAX)
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_ensure_index_version() {
        let db = test_db();
        db.replace_session(&create_test_session("claude:v", Source::Claude, 2), &[])
            .unwrap();

        assert!(db.ensure_index_version("1.1").unwrap());
        assert_eq!(
            db.get_file_stamp("claude:v").unwrap(),
            Some(FileStamp { mtime: 0, size: 0 })
        );
        assert!(!db.ensure_index_version("1.1").unwrap());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ais.db");

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        assert!(path.exists());
        assert!(db.get_database_size().unwrap() > 0);
    }
}
