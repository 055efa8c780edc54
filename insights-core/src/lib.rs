//! # insights-core
//!
//! Core library for agent-insights - analytics over coding-agent
//! session transcripts.
//!
//! This library provides:
//! - A fault-tolerant transcript parser that turns heterogeneous JSON
//!   logs into a normalized event timeline with derived statistics
//! - A SQLite storage layer with full-text search over events and
//!   retained learnings
//! - Correlation scoring between sessions and git commits
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use insights_core::{Config, Database};
//! use insights_core::ingest::IndexCoordinator;
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! // Index every discovered transcript
//! let coordinator = IndexCoordinator::new(config, db);
//! let result = coordinator.index_all(false).expect("indexing failed");
//! println!("{} sessions indexed", result.sessions_created);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, DatabaseStats, SearchHit};
pub use error::{Error, Result};
pub use ingest::{IndexCoordinator, IndexResult};
pub use types::*;

// Public modules
pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod types;
