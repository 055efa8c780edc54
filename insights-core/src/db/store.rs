//! Database store layer
//!
//! Provides insert, query, and search operations for all entity types.
//!
//! Writes for a whole session go through [`Database::insert_parsed_session`],
//! which commits every table (including the FTS shadow tables) in a single
//! transaction: a session is either fully stored or not stored at all.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// One full-text (or fallback substring) hit in event content.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Session the event belongs to
    pub session_id: String,
    /// Rowid of the matching event
    pub event_id: i64,
    /// The matching content
    pub content: String,
}

/// Aggregate counts for status displays.
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub session_count: i64,
    pub event_count: i64,
    pub tool_call_count: i64,
    pub error_count: i64,
    pub learning_count: i64,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

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
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Session writes
    // ============================================

    /// Store everything parsed from one transcript in a single transaction.
    ///
    /// FTS shadow rows are written alongside the base rows, inside the
    /// same transaction, so the search index never drifts from the data.
    pub fn insert_parsed_session(&self, parsed: &ParsedSession) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let s = &parsed.session;
        tx.execute(
            r#"
            INSERT INTO sessions (id, source, project_path, project_name, git_branch, git_user,
                                  started_at, ended_at, turn_count, tool_call_count, error_count,
                                  files_modified, token_estimate, outcome, plan_mode_used,
                                  thinking_used, sub_agents_used, primary_tools, summary, file_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                s.id,
                s.source.as_str(),
                s.project_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                s.project_name,
                s.git_branch,
                s.git_user,
                s.started_at.map(|t| t.to_rfc3339()),
                s.ended_at.map(|t| t.to_rfc3339()),
                s.turn_count,
                s.tool_call_count,
                s.error_count,
                s.files_modified,
                s.token_estimate,
                s.outcome.as_str(),
                s.plan_mode_used,
                s.thinking_used,
                s.sub_agents_used,
                serde_json::to_string(&s.primary_tools)?,
                s.summary,
                s.file_path,
            ],
        )?;

        for event in &parsed.events {
            tx.execute(
                "INSERT INTO events (session_id, seq, event_type, ts, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.session_id,
                    event.seq,
                    event.event_type.as_str(),
                    event.timestamp.map(|t| t.to_rfc3339()),
                    event.content,
                ],
            )?;

            if let Some(content) = event.content.as_deref().filter(|c| !c.is_empty()) {
                let event_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO events_fts (content, session_id, event_id)
                     VALUES (?1, ?2, ?3)",
                    params![content, event.session_id, event_id],
                )?;
            }
        }

        for call in &parsed.tool_calls {
            tx.execute(
                "INSERT INTO tool_calls (session_id, event_seq, tool_name, parameters,
                                         tool_use_id, result, success)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    call.session_id,
                    call.event_seq,
                    call.tool_name,
                    call.parameters.to_string(),
                    call.tool_use_id,
                    call.result,
                    call.success,
                ],
            )?;
        }

        for error in &parsed.errors {
            tx.execute(
                "INSERT INTO errors (session_id, event_seq, tool_use_id, kind, excerpt, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    error.session_id,
                    error.event_seq,
                    error.tool_use_id,
                    error.kind.as_str(),
                    error.excerpt,
                    error.resolved,
                ],
            )?;
        }

        for skill in &parsed.skill_invocations {
            tx.execute(
                "INSERT INTO skill_invocations (session_id, skill_name, category, source_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    skill.session_id,
                    skill.skill_name,
                    skill.category.as_str(),
                    skill.source_path,
                ],
            )?;
        }

        for agent in &parsed.sub_agent_invocations {
            tx.execute(
                "INSERT INTO sub_agent_invocations (session_id, agent_tool, task, allowed_tools)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    agent.session_id,
                    agent.agent_tool,
                    agent.task,
                    serde_json::to_string(&agent.allowed_tools)?,
                ],
            )?;
        }

        for seq in &parsed.tool_sequences {
            tx.execute(
                "INSERT INTO tool_sequences (session_id, sequence, length, all_succeeded)
                 VALUES (?1, ?2, ?3, ?4)",
                params![seq.session_id, seq.sequence, seq.length, seq.all_succeeded],
            )?;
        }

        tx.execute(
            "INSERT INTO session_modes (session_id, plan_mode_count, compact_count,
                                        thinking_count, sub_agent_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parsed.modes.session_id,
                parsed.modes.plan_mode_count,
                parsed.modes.compact_count,
                parsed.modes.thinking_count,
                parsed.modes.sub_agent_count,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Whether a session has already been indexed for this transcript path.
    pub fn session_exists_for_path(&self, path: &Path) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE file_path = ?",
            [path.to_string_lossy().to_string()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete the session indexed for a transcript path, with all of its
    /// dependent rows, in child-before-parent order.
    ///
    /// Learnings are never deleted: rows linked to the session keep their
    /// content and lose only the session link. Returns whether a session
    /// was actually deleted, so a delete-then-insert is a safe reindex.
    pub fn delete_session_by_path(&self, path: &Path) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let path_str = path.to_string_lossy().to_string();
        let session_id: Option<String> = tx
            .query_row(
                "SELECT id FROM sessions WHERE file_path = ?",
                [&path_str],
                |r| r.get(0),
            )
            .optional()?;

        let session_id = match session_id {
            Some(id) => id,
            None => return Ok(false),
        };

        // Learnings survive with the link cleared
        tx.execute(
            "UPDATE learnings SET session_id = NULL WHERE session_id = ?",
            [&session_id],
        )?;

        tx.execute("DELETE FROM events_fts WHERE session_id = ?", [&session_id])?;
        tx.execute("DELETE FROM session_modes WHERE session_id = ?", [&session_id])?;
        tx.execute("DELETE FROM tool_sequences WHERE session_id = ?", [&session_id])?;
        tx.execute(
            "DELETE FROM sub_agent_invocations WHERE session_id = ?",
            [&session_id],
        )?;
        tx.execute(
            "DELETE FROM skill_invocations WHERE session_id = ?",
            [&session_id],
        )?;
        tx.execute("DELETE FROM errors WHERE session_id = ?", [&session_id])?;
        tx.execute("DELETE FROM tool_calls WHERE session_id = ?", [&session_id])?;
        tx.execute("DELETE FROM events WHERE session_id = ?", [&session_id])?;
        tx.execute("DELETE FROM sessions WHERE id = ?", [&session_id])?;

        tx.commit()?;
        Ok(true)
    }

    /// Update the stored summary for a session.
    pub fn update_session_summary(&self, session_id: &str, summary: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET summary = ?1 WHERE id = ?2",
            params![summary, session_id],
        )?;
        if updated == 0 {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    // ============================================
    // Session reads
    // ============================================

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM sessions WHERE id = ?", [id], |row| {
            Self::row_to_session(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Get the session indexed for a transcript path
    pub fn get_session_by_path(&self, path: &Path) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM sessions WHERE file_path = ?",
            [path.to_string_lossy().to_string()],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List sessions, most recent first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions ORDER BY started_at DESC LIMIT ?",
        )?;
        let sessions = stmt
            .query_map([limit as i64], Self::row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Get the full event timeline of a session, ordered by seq.
    pub fn get_events(&self, session_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE session_id = ? ORDER BY seq",
        )?;
        let events = stmt
            .query_map([session_id], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Get the tool calls of a session, in timeline order.
    pub fn get_tool_calls(&self, session_id: &str) -> Result<Vec<ToolCall>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM tool_calls WHERE session_id = ? ORDER BY event_seq",
        )?;
        let calls = stmt
            .query_map([session_id], Self::row_to_tool_call)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(calls)
    }

    /// Get the extracted errors of a session.
    pub fn get_errors(&self, session_id: &str) -> Result<Vec<ErrorRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM errors WHERE session_id = ? ORDER BY event_seq",
        )?;
        let errors = stmt
            .query_map([session_id], Self::row_to_error)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(errors)
    }

    // ============================================
    // Learning operations
    // ============================================

    /// Insert a learning (and its FTS shadow row) atomically.
    pub fn insert_learning(&self, learning: &Learning) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO learnings (id, session_id, content, learning_type, scope,
                                   confidence, tags, related_files, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                learning.id,
                learning.session_id,
                learning.content,
                learning.learning_type,
                learning.scope,
                learning.confidence,
                serde_json::to_string(&learning.tags)?,
                serde_json::to_string(&learning.related_files)?,
                learning.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO learnings_fts (content, learning_id) VALUES (?1, ?2)",
            params![learning.content, learning.id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Get a learning by ID
    pub fn get_learning(&self, id: &str) -> Result<Option<Learning>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM learnings WHERE id = ?", [id], |row| {
            Self::row_to_learning(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// List learnings, newest first. With a session ID, only those still
    /// linked to that session.
    pub fn list_learnings(&self, session_id: Option<&str>) -> Result<Vec<Learning>> {
        let conn = self.conn.lock().unwrap();
        let mut learnings = Vec::new();
        match session_id {
            Some(sid) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM learnings WHERE session_id = ? ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map([sid], Self::row_to_learning)?;
                for row in rows {
                    learnings.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM learnings ORDER BY created_at DESC")?;
                let rows = stmt.query_map([], Self::row_to_learning)?;
                for row in rows {
                    learnings.push(row?);
                }
            }
        }
        Ok(learnings)
    }

    // ============================================
    // Search
    // ============================================

    /// Full-text search over event content.
    ///
    /// The query is sanitized into prefix terms first; if sanitization
    /// leaves nothing usable, or FTS rejects the query anyway, the search
    /// transparently falls back to a LIKE substring scan. Callers never
    /// see a syntax error from user input.
    pub fn search_events(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().unwrap();

        if let Some(fts_query) = sanitize_fts_query(query) {
            match Self::search_events_fts(&conn, &fts_query, limit) {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    tracing::debug!(query, error = %e, "FTS query failed, falling back to LIKE");
                }
            }
        }
        Self::search_events_like(&conn, query, limit)
    }

    fn search_events_fts(
        conn: &Connection,
        fts_query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut stmt = conn.prepare(
            "SELECT session_id, event_id, content FROM events_fts
             WHERE events_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok(SearchHit {
                    session_id: row.get(0)?,
                    event_id: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    fn search_events_like(conn: &Connection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let pattern = format!("%{}%", query.trim());
        let mut stmt = conn.prepare(
            "SELECT session_id, id, content FROM events
             WHERE content LIKE ?1 ORDER BY session_id, seq LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![pattern, limit as i64], |row| {
                Ok(SearchHit {
                    session_id: row.get(0)?,
                    event_id: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    /// Full-text search over learnings, with the same LIKE fallback as
    /// [`Self::search_events`].
    pub fn search_learnings(&self, query: &str, limit: usize) -> Result<Vec<Learning>> {
        let conn = self.conn.lock().unwrap();

        if let Some(fts_query) = sanitize_fts_query(query) {
            let result = (|| -> Result<Vec<Learning>> {
                let mut stmt = conn.prepare(
                    "SELECT l.* FROM learnings l
                     JOIN learnings_fts f ON f.learning_id = l.id
                     WHERE learnings_fts MATCH ?1 ORDER BY rank LIMIT ?2",
                )?;
                let learnings = stmt
                    .query_map(params![fts_query, limit as i64], Self::row_to_learning)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(learnings)
            })();
            match result {
                Ok(learnings) => return Ok(learnings),
                Err(e) => {
                    tracing::debug!(query, error = %e, "FTS query failed, falling back to LIKE");
                }
            }
        }

        let pattern = format!("%{}%", query.trim());
        let mut stmt = conn.prepare(
            "SELECT * FROM learnings WHERE content LIKE ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let learnings = stmt
            .query_map(params![pattern, limit as i64], Self::row_to_learning)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(learnings)
    }

    // ============================================
    // Stats
    // ============================================

    /// Aggregate row counts for status output.
    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .map_err(Error::from)
        };
        Ok(DatabaseStats {
            session_count: count("sessions")?,
            event_count: count("events")?,
            tool_call_count: count("tool_calls")?,
            error_count: count("errors")?,
            learning_count: count("learnings")?,
        })
    }

    // ============================================
    // Row mappers
    // ============================================

    fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let source_str: String = row.get("source")?;
        let outcome_str: String = row.get("outcome")?;
        let project_path: Option<String> = row.get("project_path")?;
        let primary_tools_str: String = row.get("primary_tools")?;

        Ok(Session {
            id: row.get("id")?,
            source: SourceSystem::from_str(&source_str).unwrap_or(SourceSystem::ClaudeCode),
            project_path: project_path.map(PathBuf::from),
            project_name: row.get("project_name")?,
            git_branch: row.get("git_branch")?,
            git_user: row.get("git_user")?,
            started_at: parse_datetime(row.get("started_at")?),
            ended_at: parse_datetime(row.get("ended_at")?),
            turn_count: row.get("turn_count")?,
            tool_call_count: row.get("tool_call_count")?,
            error_count: row.get("error_count")?,
            files_modified: row.get("files_modified")?,
            token_estimate: row.get("token_estimate")?,
            outcome: Outcome::from_str(&outcome_str).unwrap_or_default(),
            plan_mode_used: row.get("plan_mode_used")?,
            thinking_used: row.get("thinking_used")?,
            sub_agents_used: row.get("sub_agents_used")?,
            primary_tools: serde_json::from_str(&primary_tools_str).unwrap_or_default(),
            summary: row.get("summary")?,
            file_path: row.get("file_path")?,
        })
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        let type_str: String = row.get("event_type")?;
        Ok(Event {
            session_id: row.get("session_id")?,
            seq: row.get("seq")?,
            event_type: EventType::from_str(&type_str).unwrap_or(EventType::AssistantMessage),
            timestamp: parse_datetime(row.get("ts")?),
            content: row.get("content")?,
        })
    }

    fn row_to_tool_call(row: &Row) -> rusqlite::Result<ToolCall> {
        let params_str: String = row.get("parameters")?;
        Ok(ToolCall {
            session_id: row.get("session_id")?,
            event_seq: row.get("event_seq")?,
            tool_name: row.get("tool_name")?,
            parameters: serde_json::from_str(&params_str).unwrap_or(serde_json::json!({})),
            tool_use_id: row.get("tool_use_id")?,
            result: row.get("result")?,
            success: row.get("success")?,
        })
    }

    fn row_to_error(row: &Row) -> rusqlite::Result<ErrorRecord> {
        let kind_str: String = row.get("kind")?;
        Ok(ErrorRecord {
            session_id: row.get("session_id")?,
            event_seq: row.get("event_seq")?,
            tool_use_id: row.get("tool_use_id")?,
            kind: ErrorKind::from_str(&kind_str).unwrap_or(ErrorKind::Generic),
            excerpt: row.get("excerpt")?,
            resolved: row.get("resolved")?,
        })
    }

    fn row_to_learning(row: &Row) -> rusqlite::Result<Learning> {
        let tags_str: String = row.get("tags")?;
        let related_str: String = row.get("related_files")?;
        let created_str: String = row.get("created_at")?;

        Ok(Learning {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            content: row.get("content")?,
            learning_type: row.get("learning_type")?,
            scope: row.get("scope")?,
            confidence: row.get("confidence")?,
            tags: serde_json::from_str(&tags_str).unwrap_or_default(),
            related_files: serde_json::from_str(&related_str).unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turn free-form user input into an FTS5 prefix query.
///
/// Operator characters become spaces, tokens shorter than two characters
/// and bare operator words are dropped, and every surviving token gets a
/// `*` suffix. Returns `None` when nothing usable survives, signalling
/// the caller to use the LIKE fallback instead.
fn sanitize_fts_query(query: &str) -> Option<String> {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .filter(|t| !matches!(*t, "AND" | "OR" | "NOT" | "NEAR"))
        .map(|t| format!("{}*", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
