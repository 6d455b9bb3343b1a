//! ais - search local AI assistant conversation logs
//!
//! Indexes Claude Code and Codex JSONL transcripts into SQLite and searches
//! them from the command line.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/ais/ais.db (~/.local/share/ais/ais.db)
//! - Logs: $XDG_STATE_HOME/ais/ais.YYYY-MM-DD.log (~/.local/state/ais/), rotated daily
//! - Config: $XDG_CONFIG_HOME/ais/config.toml (~/.config/ais/config.toml)

mod process_lock;

use ais_core::ingest::timestamp::format_timestamp;
use ais_core::scan::scan_root;
use ais_core::search::{list_all, search};
use ais_core::{
    ChunkWindow, Config, Database, IndexCoordinator, Role, SearchResult, SessionFilter,
    SessionRecord, Source,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_index_guard;
use std::io::{self, Write};

#[derive(Parser)]
#[command(name = "ais")]
#[command(about = "Index and search local AI assistant conversation logs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the index up to date with the log files on disk
    Index,

    /// Search indexed conversations
    Search {
        /// Words to look for
        query: String,

        /// Only sessions from this source (claude, codex)
        #[arg(long)]
        source: Option<Source>,

        /// Only chunks written by this role (user, assistant, other)
        #[arg(long)]
        role: Option<Role>,

        /// Only sessions updated on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Maximum results (default: from config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// List indexed sessions, newest first
    List {
        /// Only sessions from this source (claude, codex)
        #[arg(long)]
        source: Option<Source>,

        /// Only sessions updated on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Maximum sessions (0 = all)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,

        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Print a session's chunks
    Show {
        /// Session key, as printed by search or list
        key: String,

        /// Chunk id to center on
        #[arg(long)]
        hit: Option<i64>,

        /// Chunks to show on each side of the hit
        #[arg(short, long, default_value_t = 5)]
        context: usize,
    },

    /// Check roots, index health and database size
    Doctor,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        ais_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Index => run_index(&config),
        Command::Search {
            query,
            source,
            role,
            since,
            limit,
            json,
        } => {
            let filter = SessionFilter {
                source,
                role,
                since,
            };
            let limit = limit.unwrap_or(config.search.default_limit);
            run_search(&config, &query, &filter, limit, json)
        }
        Command::List {
            source,
            since,
            limit,
            json,
        } => {
            let filter = SessionFilter {
                source,
                role: None,
                since,
            };
            run_list(&config, &filter, limit, json)
        }
        Command::Show { key, hit, context } => run_show(&config, &key, hit, context),
        Command::Doctor => run_doctor(&config),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let db_path = config.database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open_with_timeout(&db_path, config.database.busy_timeout())
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.migrate().context("failed to run database migrations")?;
    Ok(db)
}

// ============================================
// index
// ============================================

fn run_index(config: &Config) -> Result<()> {
    let db_path = config.database_path();
    let _index_guard = acquire_index_guard(&db_path).context("failed to acquire index lock")?;

    let db = open_database(config)?;
    let roots = config.source_roots();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let stats = IndexCoordinator::new(&db)
        .index_all_with_progress(&roots, |current, total, path| {
            if current == 0 {
                pb.set_length(total as u64);
            }
            pb.set_position(current as u64);
            pb.set_message(
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("...")
                    .to_string(),
            );
        })
        .context("index run failed")?;

    pb.finish_and_clear();

    if stats.forced_reindex {
        println!("Index format changed; every session was rebuilt");
    }
    println!("{}", stats);

    Ok(())
}

// ============================================
// search / list
// ============================================

fn run_search(
    config: &Config,
    query: &str,
    filter: &SessionFilter,
    limit: usize,
    json: bool,
) -> Result<()> {
    let db = open_database(config)?;
    let results = search(&db, query, filter, limit).context("search failed")?;
    print_results(&results, json)
}

fn run_list(config: &Config, filter: &SessionFilter, limit: usize, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let results = list_all(&db, filter, limit).context("failed to list sessions")?;
    print_results(&results, json)
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for result in results {
        if json {
            let line = serde_json::to_string(result).context("failed to encode result")?;
            writeln!(out, "{}", line)?;
        } else {
            writeln!(out, "{}", tsv_row(result))?;
        }
    }

    Ok(())
}

/// One tab-separated line: key, chunk, updated, source, cwd, summary, snippet.
fn tsv_row(result: &SearchResult) -> String {
    let chunk_id = result
        .chunk_id
        .map(|id| id.to_string())
        .unwrap_or_default();

    [
        flatten(&result.session_key),
        chunk_id,
        format_timestamp(result.updated_at),
        result.source.to_string(),
        flatten(&result.cwd),
        flatten(&result.summary),
        flatten(&result.snippet),
    ]
    .join("\t")
}

/// Replace tabs and line breaks so a field stays on one TSV cell.
fn flatten(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

// ============================================
// show
// ============================================

fn run_show(config: &Config, key: &str, hit: Option<i64>, context: usize) -> Result<()> {
    let db = open_database(config)?;

    let session = db
        .get_session_by_key(key)
        .context("failed to load session")?
        .with_context(|| format!("no session with key {}", key))?;
    let window = db
        .get_chunks_window(key, hit, context)
        .context("failed to load chunks")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_session(&mut out, &session, &window)?;
    Ok(())
}

fn write_session(
    out: &mut impl Write,
    session: &SessionRecord,
    window: &ChunkWindow,
) -> io::Result<()> {
    writeln!(out, "{}", session.session_key)?;
    writeln!(out, "source:  {}", session.source.display_name())?;
    if !session.cwd.is_empty() {
        writeln!(out, "cwd:     {}", session.cwd)?;
    }
    writeln!(out, "updated: {}", format_timestamp(session.updated_at))?;
    writeln!(out, "file:    {}", session.file_path.display())?;
    if !session.summary.is_empty() {
        writeln!(out, "summary: {}", session.summary)?;
    }
    writeln!(out)?;

    if window.start_offset > 0 {
        writeln!(out, "  ... {} earlier chunk(s)", window.start_offset)?;
    }

    for (i, chunk) in window.chunks.iter().enumerate() {
        let marker = if window.hit_index == Some(i) { '>' } else { ' ' };
        writeln!(
            out,
            "{} [{}] {} {}/{} (line {})",
            marker,
            chunk.chunk_id,
            format_timestamp(chunk.timestamp),
            chunk.role,
            chunk.kind.as_str(),
            chunk.line_number
        )?;
        for line in chunk.text.lines() {
            writeln!(out, "    {}", line)?;
        }
    }

    let shown_end = window.start_offset + window.chunks.len();
    if shown_end < window.total {
        writeln!(out, "  ... {} later chunk(s)", window.total - shown_end)?;
    }

    Ok(())
}

// ============================================
// doctor
// ============================================

fn run_doctor(config: &Config) -> Result<()> {
    println!("Roots:");
    for (source, root) in config.source_roots().iter() {
        if root.is_dir() {
            let files = scan_root(source, root).len();
            println!(
                "  - {}: {} file(s) at {}",
                source.display_name(),
                files,
                root.display()
            );
        } else {
            println!("  - {}: missing ({})", source.display_name(), root.display());
        }
    }

    let db_path = config.database_path();
    let db = open_database(config)?;
    let stats = db.store_stats().context("failed to read store statistics")?;
    let size = db
        .get_database_size()
        .context("failed to read database size")?;

    println!();
    println!("Database: {}", db_path.display());
    println!("  sessions: {}", stats.sessions);
    println!("  chunks:   {}", stats.chunks);
    println!("  fts rows: {}", stats.fts_rows);
    println!(
        "  fts in sync: {}",
        if stats.fts_in_sync() { "yes" } else { "NO" }
    );
    println!("  size: {}", format_bytes(size));

    println!();
    println!("Logs: {}", Config::log_dir().display());

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}
