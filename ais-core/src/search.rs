//! Search over indexed chunks
//!
//! Two strategies share one result shape:
//!
//! - **Full-text**: FTS5 `MATCH`, ranked by `bm25`, snippets from FTS5.
//! - **Substring**: `LIKE` scan for queries containing CJK characters,
//!   which the `unicode61` tokenizer does not split into words. Newest
//!   sessions first, snippets cut locally.
//!
//! Both strategies over-fetch, then keep the best hit per session.

use crate::db::repo::since_bound;
use crate::db::{Database, SessionFilter};
use crate::error::{Error, Result};
use crate::ingest::timestamp::parse_timestamp;
use crate::types::{Role, SearchResult, Source};
use rusqlite::Row;
use std::collections::HashSet;

/// Results returned when the caller passes a limit of 0.
pub const DEFAULT_LIMIT: usize = 100;

/// Rows fetched per requested result, so dedup still fills the limit.
const OVERFETCH: usize = 3;

/// Characters of context on each side of a substring match.
const SNIPPET_CONTEXT: usize = 30;

pub const MATCH_OPEN: &str = ">>>";
pub const MATCH_CLOSE: &str = "<<<";
const ELLIPSIS: &str = "...";

/// Which query path a search takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FullText,
    Substring,
}

impl Strategy {
    pub fn for_query(query: &str) -> Self {
        if contains_cjk(query) {
            Strategy::Substring
        } else {
            Strategy::FullText
        }
    }
}

/// Whether `s` has a Han, kana or CJK symbol code point.
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(|c| {
        matches!(c as u32,
            0x3000..=0x303F     // CJK symbols and punctuation
            | 0x3040..=0x309F   // Hiragana
            | 0x30A0..=0x30FF   // Katakana
            | 0x31F0..=0x31FF   // Katakana phonetic extensions
            | 0x3400..=0x4DBF   // CJK extension A
            | 0x4E00..=0x9FFF   // CJK unified ideographs
            | 0xF900..=0xFAFF   // CJK compatibility ideographs
            | 0xFF65..=0xFF9F   // Halfwidth katakana
            | 0x20000..=0x2FA1F // Supplementary ideographic planes
        )
    })
}

/// Search chunk text.
///
/// Returns at most one result per session, best first. A limit of 0 means
/// [`DEFAULT_LIMIT`]. Blank queries and malformed full-text syntax are errors.
pub fn search(
    db: &Database,
    query: &str,
    filter: &SessionFilter,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidQuery("query is empty".to_string()));
    }

    let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
    let fetch = limit.saturating_mul(OVERFETCH);
    let strategy = Strategy::for_query(query);

    let rows = match strategy {
        Strategy::FullText => search_fts(db, query, filter, fetch)?,
        Strategy::Substring => search_like(db, query, filter, fetch)?,
    };

    let results = dedup_by_session(rows, limit);
    tracing::debug!(
        query,
        ?strategy,
        results = results.len(),
        "Search complete"
    );
    Ok(results)
}

/// List sessions newest first, as results without a chunk.
///
/// The role filter does not apply. A limit of 0 means no limit.
pub fn list_all(db: &Database, filter: &SessionFilter, limit: usize) -> Result<Vec<SearchResult>> {
    let sessions = db.list_sessions(filter, limit)?;
    Ok(sessions
        .into_iter()
        .map(|s| SearchResult {
            session_key: s.session_key,
            chunk_id: None,
            updated_at: s.updated_at,
            source: s.source,
            cwd: s.cwd,
            summary: s.summary,
            snippet: String::new(),
            role: None,
            rank: 0.0,
        })
        .collect())
}

/// Keep the first result for each session, up to `limit`.
fn dedup_by_session(rows: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| seen.insert(r.session_key.clone()))
        .take(limit)
        .collect()
}

/// Filter clauses and their parameters, appended after the match clause.
fn push_filters(
    filter: &SessionFilter,
    sql: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    if let Some(source) = &filter.source {
        sql.push_str(" AND s.source = ?");
        params.push(Box::new(source.as_str().to_string()));
    }

    if let Some(role) = &filter.role {
        sql.push_str(" AND c.role = ?");
        params.push(Box::new(role.as_str().to_string()));
    }

    if let Some(since) = &filter.since {
        sql.push_str(" AND s.updated_at >= ?");
        params.push(Box::new(since_bound(since)));
    }
}

fn run_query<F>(
    db: &Database,
    sql: &str,
    params: Vec<Box<dyn rusqlite::ToSql>>,
    map: F,
) -> Result<Vec<SearchResult>>
where
    F: FnMut(&Row) -> rusqlite::Result<SearchResult>,
{
    let conn = db.connection();
    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(sql)?;
    let results = stmt
        .query_map(params_refs.as_slice(), map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

/// Columns shared by both strategies, in order.
const RESULT_COLUMNS: &str =
    "c.session_key, c.chunk_id, s.updated_at, s.source, s.cwd, s.summary, c.role";

fn row_to_result(row: &Row, snippet: String, rank: f64) -> rusqlite::Result<SearchResult> {
    let updated_at: String = row.get(2)?;
    let source: String = row.get(3)?;
    let role: String = row.get(6)?;

    Ok(SearchResult {
        session_key: row.get(0)?,
        chunk_id: Some(row.get(1)?),
        updated_at: parse_timestamp(&updated_at),
        source: source.parse().unwrap_or(Source::Claude),
        cwd: row.get(4)?,
        summary: row.get(5)?,
        snippet,
        role: Some(role.parse().unwrap_or(Role::Other)),
        rank,
    })
}

fn search_fts(
    db: &Database,
    query: &str,
    filter: &SessionFilter,
    fetch: usize,
) -> Result<Vec<SearchResult>> {
    let mut sql = format!(
        r#"
        SELECT {RESULT_COLUMNS},
               snippet(chunks_fts, 0, '{MATCH_OPEN}', '{MATCH_CLOSE}', '{ELLIPSIS}', 40) AS snip,
               bm25(chunks_fts) AS score
        FROM chunks_fts
        JOIN chunks c ON c.id = chunks_fts.rowid
        JOIN sessions s ON s.session_key = c.session_key
        WHERE chunks_fts MATCH ?
        "#
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.to_string())];
    push_filters(filter, &mut sql, &mut params);
    sql.push_str(" ORDER BY score ASC LIMIT ?");
    params.push(Box::new(sql_limit(fetch)));

    run_query(db, &sql, params, |row| {
        let snippet: String = row.get(7)?;
        let score: f64 = row.get(8)?;
        row_to_result(row, snippet, score)
    })
}

/// Substring scan for queries the tokenizer cannot split.
///
/// SQLite `LIKE` folds case for ASCII letters only, so `Ä` does not match
/// `ä` here even though the local snippet would highlight it.
fn search_like(
    db: &Database,
    query: &str,
    filter: &SessionFilter,
    fetch: usize,
) -> Result<Vec<SearchResult>> {
    let mut sql = format!(
        r#"
        SELECT {RESULT_COLUMNS}, c.text
        FROM chunks c
        JOIN sessions s ON s.session_key = c.session_key
        WHERE c.text LIKE ? ESCAPE '\'
        "#
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(format!("%{}%", escape_like(query)))];
    push_filters(filter, &mut sql, &mut params);
    sql.push_str(" ORDER BY s.updated_at DESC, c.session_key ASC, c.chunk_id ASC LIMIT ?");
    params.push(Box::new(sql_limit(fetch)));

    run_query(db, &sql, params, |row| {
        let text: String = row.get(7)?;
        row_to_result(row, make_snippet(&text, query, SNIPPET_CONTEXT), 0.0)
    })
}

/// `LIMIT` bind value; anything past `i64::MAX` means "no limit".
fn sql_limit(fetch: usize) -> i64 {
    i64::try_from(fetch).unwrap_or(i64::MAX)
}

/// Escape `LIKE` wildcards so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Excerpt around the first case-insensitive occurrence of `query`.
///
/// `context` characters are kept on each side of the match, which is wrapped
/// in [`MATCH_OPEN`] / [`MATCH_CLOSE`]. Without a match the first
/// `2 * context` characters are returned.
pub fn make_snippet(text: &str, query: &str, context: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = query.chars().collect();

    let found = if needle.is_empty() || needle.len() > chars.len() {
        None
    } else {
        (0..=chars.len() - needle.len()).find(|&i| {
            needle
                .iter()
                .enumerate()
                .all(|(j, &q)| chars_eq_ignore_case(chars[i + j], q))
        })
    };

    let Some(pos) = found else {
        let head = context * 2;
        if chars.len() > head {
            let mut s: String = chars[..head].iter().collect();
            s.push_str(ELLIPSIS);
            return s;
        }
        return text.to_string();
    };

    let match_end = pos + needle.len();
    let start = pos.saturating_sub(context);
    let end = (match_end + context).min(chars.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..pos]);
    snippet.push_str(MATCH_OPEN);
    snippet.extend(&chars[pos..match_end]);
    snippet.push_str(MATCH_CLOSE);
    snippet.extend(&chars[match_end..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkKind, SessionRecord};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::path::PathBuf;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn add_session(db: &Database, key: &str, source: Source, day: u32, texts: &[(Role, &str)]) {
        let ts = Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap();
        let session = SessionRecord {
            session_key: key.to_string(),
            source,
            file_path: PathBuf::from(format!("/logs/{}.jsonl", key)),
            cwd: "/work".to_string(),
            created_at: Some(ts),
            updated_at: Some(ts),
            summary: format!("summary of {}", key),
            mtime: 1,
            size: 1,
        };
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, (role, text))| Chunk {
                session_key: key.to_string(),
                chunk_id: i as i64,
                timestamp: Some(ts),
                role: *role,
                kind: ChunkKind::Text,
                text: text.to_string(),
                line_number: i as i64 + 1,
            })
            .collect();
        db.replace_session(&session, &chunks).unwrap();
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(Strategy::for_query("websocket"), Strategy::FullText);
        assert_eq!(Strategy::for_query("café résumé"), Strategy::FullText);
        assert_eq!(Strategy::for_query("数据库"), Strategy::Substring);
        assert_eq!(Strategy::for_query("テスト"), Strategy::Substring);
        assert_eq!(Strategy::for_query("ひらがな"), Strategy::Substring);
        assert_eq!(Strategy::for_query("mixed 日本"), Strategy::Substring);
        assert_eq!(Strategy::for_query("「quote」"), Strategy::Substring);
    }

    #[test]
    fn test_blank_query_rejected() {
        let db = test_db();
        let err = search(&db, "   ", &SessionFilter::default(), 10).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_full_text_snippet_and_dedup() {
        let db = test_db();
        add_session(
            &db,
            "claude:a",
            Source::Claude,
            2,
            &[(Role::User, "hello world"), (Role::Assistant, "the world is big")],
        );
        add_session(&db, "codex:b", Source::Codex, 3, &[(Role::User, "world peace")]);

        let results = search(&db, "world", &SessionFilter::default(), 10).unwrap();
        assert_eq!(results.len(), 2);
        let keys: HashSet<_> = results.iter().map(|r| r.session_key.as_str()).collect();
        assert_eq!(keys, HashSet::from(["claude:a", "codex:b"]));
        assert!(results.iter().all(|r| r.snippet.contains(">>>world<<<")));
        assert!(results.iter().all(|r| r.chunk_id.is_some() && r.role.is_some()));
        assert!(results[0].rank <= results[1].rank);
    }

    #[test]
    fn test_filters() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 2, &[(Role::User, "deploy script")]);
        add_session(
            &db,
            "codex:b",
            Source::Codex,
            20,
            &[(Role::Assistant, "deploy finished")],
        );

        let by_source = SessionFilter {
            source: Some(Source::Codex),
            ..Default::default()
        };
        let results = search(&db, "deploy", &by_source, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_key, "codex:b");

        let by_role = SessionFilter {
            role: Some(Role::User),
            ..Default::default()
        };
        let results = search(&db, "deploy", &by_role, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].role, Some(Role::User));

        let by_since = SessionFilter {
            since: NaiveDate::from_ymd_opt(2025, 1, 10),
            ..Default::default()
        };
        let results = search(&db, "deploy", &by_since, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_key, "codex:b");
    }

    #[test]
    fn test_limit_applies_after_dedup() {
        let db = test_db();
        for (i, key) in ["claude:1", "claude:2", "claude:3"].iter().enumerate() {
            add_session(
                &db,
                key,
                Source::Claude,
                (i + 1) as u32,
                &[(Role::User, "needle one"), (Role::Assistant, "needle two")],
            );
        }
        let results = search(&db, "needle", &SessionFilter::default(), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_ne!(results[0].session_key, results[1].session_key);
    }

    #[test]
    fn test_huge_limit_is_clamped() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 2, &[(Role::User, "needle")]);
        add_session(&db, "claude:b", Source::Claude, 3, &[(Role::User, "针 needle")]);

        let results = search(&db, "needle", &SessionFilter::default(), usize::MAX).unwrap();
        assert_eq!(results.len(), 2);
        let results = search(&db, "针", &SessionFilter::default(), usize::MAX).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[test]
    fn test_substring_case_folding_is_ascii_only() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 2, &[(Role::User, "a日本 ä日本")]);

        let ascii = search(&db, "A日本", &SessionFilter::default(), 10).unwrap();
        assert_eq!(ascii.len(), 1);
        assert!(ascii[0].snippet.contains(">>>a日本<<<"));

        assert!(search(&db, "Ä日本", &SessionFilter::default(), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_fts_syntax_error_surfaces() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 2, &[(Role::User, "text")]);
        assert!(search(&db, "\"unterminated", &SessionFilter::default(), 10).is_err());
    }

    #[test]
    fn test_substring_path() {
        let db = test_db();
        add_session(
            &db,
            "claude:old",
            Source::Claude,
            1,
            &[(Role::User, "请帮我优化数据库查询")],
        );
        add_session(
            &db,
            "codex:new",
            Source::Codex,
            5,
            &[(Role::Assistant, "数据库索引已经建立")],
        );

        let results = search(&db, "数据库", &SessionFilter::default(), 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].session_key, "codex:new");
        assert!(results.iter().all(|r| r.rank == 0.0));
        assert_eq!(results[1].snippet, "请帮我优化>>>数据库<<<查询");
    }

    #[test]
    fn test_substring_escapes_wildcards() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 1, &[(Role::User, "日本 100% done")]);
        add_session(&db, "claude:b", Source::Claude, 2, &[(Role::User, "日本 100 percent")]);

        let results = search(&db, "日本 100%", &SessionFilter::default(), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_key, "claude:a");
    }

    #[test]
    fn test_list_all() {
        let db = test_db();
        add_session(&db, "claude:a", Source::Claude, 2, &[(Role::User, "x")]);
        add_session(&db, "codex:b", Source::Codex, 9, &[(Role::User, "y")]);

        let results = list_all(&db, &SessionFilter::default(), 0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].session_key, "codex:b");
        assert!(results
            .iter()
            .all(|r| r.chunk_id.is_none() && r.role.is_none() && r.snippet.is_empty()));

        let role_only = SessionFilter {
            role: Some(Role::Assistant),
            ..Default::default()
        };
        assert_eq!(list_all(&db, &role_only, 0).unwrap().len(), 2);
        assert_eq!(list_all(&db, &SessionFilter::default(), 1).unwrap().len(), 1);
    }

    #[test]
    fn test_make_snippet_window() {
        let text = format!("{}needle{}", "a".repeat(40), "b".repeat(40));
        let snippet = make_snippet(&text, "NEEDLE", 30);
        assert_eq!(
            snippet,
            format!("...{}>>>needle<<<{}...", "a".repeat(30), "b".repeat(30))
        );
    }

    #[test]
    fn test_make_snippet_short_text() {
        assert_eq!(make_snippet("Hello World", "world", 30), "Hello >>>World<<<");
    }

    #[test]
    fn test_make_snippet_no_match() {
        let text = "z".repeat(100);
        assert_eq!(make_snippet(&text, "q", 30), format!("{}...", "z".repeat(60)));
        assert_eq!(make_snippet("short", "q", 30), "short");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }
}
