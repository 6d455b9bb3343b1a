//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! A separate index-version marker in `meta` tracks how stored chunks were
//! produced; see [`migrate_index_version`].

use rusqlite::{params, Connection, OptionalExtension};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Version of the chunking rules. Bump when parsers change what they emit so
/// existing sessions are rebuilt on the next index run.
pub const CHUNKER_VERSION: i32 = 1;

/// Key under which the index-version marker is stored in `meta`.
pub const INDEX_VERSION_KEY: &str = "index_version";

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: sessions, chunks, full-text mirror
    r#"
    -- ============================================
    -- Sessions: one row per log file
    -- ============================================

    CREATE TABLE IF NOT EXISTS sessions (
        session_key      TEXT PRIMARY KEY,
        source           TEXT NOT NULL,
        file_path        TEXT NOT NULL,
        cwd              TEXT NOT NULL DEFAULT '',
        created_at       TEXT NOT NULL DEFAULT '',
        updated_at       TEXT NOT NULL DEFAULT '',
        summary          TEXT NOT NULL DEFAULT '',

        -- Staleness stamp
        mtime            INTEGER NOT NULL DEFAULT 0,
        size             INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
    CREATE INDEX IF NOT EXISTS idx_sessions_source ON sessions(source);

    -- ============================================
    -- Chunks: indexed text units
    -- ============================================

    CREATE TABLE IF NOT EXISTS chunks (
        id               INTEGER PRIMARY KEY,
        session_key      TEXT NOT NULL REFERENCES sessions(session_key),
        chunk_id         INTEGER NOT NULL,
        ts               TEXT NOT NULL DEFAULT '',
        role             TEXT NOT NULL,
        kind             TEXT NOT NULL,
        text             TEXT NOT NULL,
        line_number      INTEGER NOT NULL,

        UNIQUE(session_key, chunk_id)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_role ON chunks(role);

    -- ============================================
    -- Full-text mirror of chunks.text
    -- ============================================

    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
        text,
        content = 'chunks',
        content_rowid = 'id',
        tokenize = 'unicode61'
    );

    CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.id, old.text);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.id, old.text);
        INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
    END;

    -- ============================================
    -- Engine metadata
    -- ============================================

    CREATE TABLE IF NOT EXISTS meta (
        key              TEXT PRIMARY KEY,
        value            TEXT NOT NULL
    );
    "#,
];

/// Marker describing the running engine: layout version and chunker version.
pub fn current_index_version() -> String {
    format!("{}.{}", SCHEMA_VERSION, CHUNKER_VERSION)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

/// Read the stored index-version marker, if any.
pub fn get_index_version(conn: &Connection) -> crate::error::Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?",
            [INDEX_VERSION_KEY],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Reset every stored stamp when the marker differs from `target`.
///
/// Zeroed stamps never match a file on disk, so the next index run rewrites
/// every session. The reset and the new marker commit together. Returns
/// whether a reset happened.
pub fn migrate_index_version(conn: &mut Connection, target: &str) -> crate::error::Result<bool> {
    let stored = get_index_version(conn)?;
    if stored.as_deref() == Some(target) {
        return Ok(false);
    }

    let tx = conn.transaction()?;
    let reset = tx.execute("UPDATE sessions SET mtime = 0, size = 0", [])?;
    tx.execute(
        r#"
        INSERT INTO meta (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![INDEX_VERSION_KEY, target],
    )?;
    tx.commit()?;

    tracing::info!(
        from = stored.as_deref().unwrap_or("none"),
        to = target,
        sessions_reset = reset,
        "Index version changed"
    );

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["sessions", "chunks", "chunks_fts", "meta"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_fts_triggers_follow_chunks() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (session_key, source, file_path) VALUES ('k', 'codex', '/k')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chunks (session_key, chunk_id, role, kind, text, line_number)
             VALUES ('k', 0, 'user', 'text', 'alpha beta', 1)",
            [],
        )
        .unwrap();

        let hits = |term: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM chunks_fts WHERE chunks_fts MATCH ?",
                [term],
                |r| r.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits("alpha"), 1);

        conn.execute("UPDATE chunks SET text = 'gamma' WHERE chunk_id = 0", [])
            .unwrap();
        assert_eq!(hits("alpha"), 0);
        assert_eq!(hits("gamma"), 1);

        conn.execute("DELETE FROM chunks", []).unwrap();
        assert_eq!(hits("gamma"), 0);
    }

    #[test]
    fn test_index_version_reset() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (session_key, source, file_path, mtime, size)
             VALUES ('k', 'claude', '/k', 100, 200)",
            [],
        )
        .unwrap();

        // First run on a store without a marker resets
        assert!(migrate_index_version(&mut conn, "1.1").unwrap());
        let stamp: (i64, i64) = conn
            .query_row("SELECT mtime, size FROM sessions", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(stamp, (0, 0));
        assert_eq!(get_index_version(&conn).unwrap().as_deref(), Some("1.1"));

        // Same marker is a no-op
        assert!(!migrate_index_version(&mut conn, "1.1").unwrap());

        // New marker resets again
        assert!(migrate_index_version(&mut conn, "1.2").unwrap());
        assert_eq!(get_index_version(&conn).unwrap().as_deref(), Some("1.2"));
    }

    #[test]
    fn test_current_index_version() {
        assert_eq!(
            current_index_version(),
            format!("{}.{}", SCHEMA_VERSION, CHUNKER_VERSION)
        );
    }
}
