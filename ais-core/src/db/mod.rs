//! Database layer for ais
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - An FTS5 mirror of chunk text kept current by triggers
//! - An index-version marker that forces re-indexing when chunking changes

pub mod repo;
pub mod schema;

pub use repo::{Database, SessionFilter};
