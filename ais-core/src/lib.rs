//! # ais-core
//!
//! Core library for ais - search across local AI assistant conversation logs.
//!
//! This library provides:
//! - Discovery of Claude Code and Codex JSONL transcripts
//! - Parsers that normalize both formats into sessions and chunks
//! - Incremental indexing into SQLite with an FTS5 mirror
//! - Hybrid search (full-text or substring) with per-session dedup
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through two paths:
//! - **Write:** [`scan`] → [`ingest::parsers`] → [`IndexCoordinator`] → [`Database`]
//! - **Read:** [`search::search`] / [`search::list_all`] → [`Database`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use ais_core::{Config, Database, IndexCoordinator, SessionFilter};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let stats = IndexCoordinator::new(&db)
//!     .index_all(&config.source_roots())
//!     .expect("index run failed");
//! println!("{}", stats);
//!
//! let hits = ais_core::search::search(&db, "websocket", &SessionFilter::default(), 20)
//!     .expect("search failed");
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, SourceRoots};
pub use db::{Database, SessionFilter};
pub use error::{Error, Result};
pub use ingest::IndexCoordinator;
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod scan;
pub mod search;
pub mod types;
