//! Database layer for insights
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations tracked in a dedicated version table
//! - Atomic per-session inserts, FTS shadow tables included
//! - Full-text search with a transparent LIKE fallback

pub mod schema;
pub mod store;

pub use store::{Database, DatabaseStats, SearchHit};
