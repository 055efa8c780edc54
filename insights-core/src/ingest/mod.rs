//! Ingestion layer for parsing coding-agent transcripts
//!
//! This module orchestrates the parsing of raw transcript files into
//! canonical database records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ Transcript Files │ ──► │ IndexCoordinator │ ──► │    Database     │
//! │ (~/.claude/...)  │     │                  │     │ (sessions, etc) │
//! └──────────────────┘     └──────────────────┘     └─────────────────┘
//!                                  │
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ TranscriptParser │
//!                         └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use insights_core::{Config, Database};
//! use insights_core::ingest::IndexCoordinator;
//!
//! let config = Config::load()?;
//! let db = Database::open(&Config::database_path())?;
//! let coordinator = IndexCoordinator::new(config, db);
//!
//! let result = coordinator.index_all(false)?;
//! println!("Indexed {} sessions", result.sessions_created);
//! ```

pub mod discover;
pub mod extract;
mod parser;

pub use discover::{discover, SessionFileRef};
pub use parser::TranscriptParser;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Result of a full indexing pass.
#[derive(Debug, Default)]
pub struct IndexResult {
    /// Number of transcripts parsed and stored
    pub files_indexed: usize,
    /// Number of transcripts skipped (already indexed, not forced)
    pub files_skipped: usize,
    /// Number of transcripts that failed terminally
    pub files_failed: usize,
    /// Number of new sessions created
    pub sessions_created: usize,
    /// Number of existing sessions replaced by a forced reindex
    pub sessions_reindexed: usize,
    /// Parse warnings accumulated across all files
    pub warnings: Vec<String>,
    /// Terminal errors (file path → error message)
    pub errors: Vec<(PathBuf, String)>,
}

/// Result of indexing a single transcript.
#[derive(Debug)]
pub struct FileIndexResult {
    /// Session ID the transcript was stored under
    pub session_id: String,
    /// Whether an existing session was replaced
    pub reindexed: bool,
    /// Parse warnings for this file
    pub warnings: Vec<String>,
}

/// Coordinates discovery, parsing, and storage of transcripts.
///
/// The coordinator is responsible for:
/// - Discovering transcript files under the configured source roots
/// - Calling the parser to extract sessions
/// - Storing results atomically via the database layer
///
/// A single failed file never aborts the pass: its error is recorded in
/// [`IndexResult::errors`] and remaining files are still processed.
pub struct IndexCoordinator {
    config: Config,
    db: Database,
    parser: TranscriptParser,
}

impl IndexCoordinator {
    /// Create a coordinator over an open database.
    pub fn new(config: Config, db: Database) -> Self {
        let parser = TranscriptParser::from_config(&config);
        Self { config, db, parser }
    }

    /// Index every discovered transcript.
    ///
    /// With `force` set, transcripts that were already indexed are
    /// deleted and re-inserted; otherwise they are skipped.
    pub fn index_all(&self, force: bool) -> Result<IndexResult> {
        self.index_all_with_progress(force, |_, _, _| {})
    }

    /// Index every discovered transcript with a progress callback.
    ///
    /// The callback receives `(current_file_index, total_files, path)`
    /// before each file is processed.
    pub fn index_all_with_progress<F>(&self, force: bool, mut on_progress: F) -> Result<IndexResult>
    where
        F: FnMut(usize, usize, &Path),
    {
        let files = discover::discover(&self.config)?;
        let total = files.len();
        let mut result = IndexResult::default();

        for (i, file) in files.iter().enumerate() {
            on_progress(i, total, &file.path);

            if !force && self.db.session_exists_for_path(&file.path)? {
                result.files_skipped += 1;
                tracing::debug!(path = %file.path.display(), "Already indexed, skipping");
                continue;
            }

            match self.index_file(&file.path) {
                Ok(file_result) => {
                    result.files_indexed += 1;
                    if file_result.reindexed {
                        result.sessions_reindexed += 1;
                    } else {
                        result.sessions_created += 1;
                    }
                    result.warnings.extend(file_result.warnings);
                }
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "Failed to index transcript");
                    result.files_failed += 1;
                    result.errors.push((file.path.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            indexed = result.files_indexed,
            skipped = result.files_skipped,
            failed = result.files_failed,
            "Indexing pass complete"
        );
        Ok(result)
    }

    /// Parse one transcript and store it, replacing any prior session
    /// for the same path.
    ///
    /// Learnings linked to a replaced session survive with their session
    /// link cleared; everything else belonging to the old session is
    /// deleted before the new rows go in.
    pub fn index_file(&self, path: &Path) -> Result<FileIndexResult> {
        let (parsed, stats) = self.parser.parse_file(path)?;

        let reindexed = self.db.delete_session_by_path(path)?;
        self.db.insert_parsed_session(&parsed)?;

        tracing::debug!(
            path = %path.display(),
            session_id = %parsed.session.id,
            events = parsed.events.len(),
            parsed_lines = stats.parsed_lines,
            skipped_lines = stats.skipped_lines,
            "Indexed transcript"
        );

        Ok(FileIndexResult {
            session_id: parsed.session.id,
            reindexed,
            warnings: stats.warnings,
        })
    }
}
