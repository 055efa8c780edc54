//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations tracked in a dedicated
//! `schema_migrations` table, one row per applied version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Core tables
    r#"
    -- ============================================
    -- Sessions and their timeline
    -- ============================================

    CREATE TABLE sessions (
        id               TEXT PRIMARY KEY,
        source           TEXT NOT NULL,      -- 'claude_code'
        project_path     TEXT,
        project_name     TEXT,
        git_branch       TEXT,
        git_user         TEXT,
        started_at       DATETIME,
        ended_at         DATETIME,
        turn_count       INTEGER NOT NULL DEFAULT 0,
        tool_call_count  INTEGER NOT NULL DEFAULT 0,
        error_count      INTEGER NOT NULL DEFAULT 0,
        files_modified   INTEGER NOT NULL DEFAULT 0,
        token_estimate   INTEGER NOT NULL DEFAULT 0,
        outcome          TEXT NOT NULL DEFAULT 'unknown',
        plan_mode_used   INTEGER NOT NULL DEFAULT 0,
        thinking_used    INTEGER NOT NULL DEFAULT 0,
        sub_agents_used  INTEGER NOT NULL DEFAULT 0,
        primary_tools    JSON NOT NULL DEFAULT '[]',
        summary          TEXT,

        -- Lineage; one session per transcript file
        file_path        TEXT NOT NULL UNIQUE
    );

    CREATE INDEX idx_sessions_project ON sessions(project_path);
    CREATE INDEX idx_sessions_outcome ON sessions(outcome);
    CREATE INDEX idx_sessions_started ON sessions(started_at DESC);

    CREATE TABLE events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        seq              INTEGER NOT NULL,
        event_type       TEXT NOT NULL,
        ts               DATETIME,
        content          TEXT,

        UNIQUE(session_id, seq)
    );

    CREATE INDEX idx_events_session_seq ON events(session_id, seq);
    CREATE INDEX idx_events_type ON events(event_type);

    CREATE TABLE tool_calls (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        event_seq        INTEGER NOT NULL,
        tool_name        TEXT NOT NULL,
        parameters       JSON NOT NULL,
        tool_use_id      TEXT,
        result           TEXT,
        success          INTEGER NOT NULL DEFAULT 1
    );

    CREATE INDEX idx_tool_calls_session ON tool_calls(session_id);
    CREATE INDEX idx_tool_calls_name ON tool_calls(tool_name);

    CREATE TABLE errors (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        event_seq        INTEGER NOT NULL,
        tool_use_id      TEXT,
        kind             TEXT NOT NULL,
        excerpt          TEXT NOT NULL,
        resolved         INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX idx_errors_session ON errors(session_id);

    CREATE TABLE skill_invocations (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        skill_name       TEXT NOT NULL,
        category         TEXT NOT NULL,
        source_path      TEXT NOT NULL
    );

    CREATE INDEX idx_skills_session ON skill_invocations(session_id);

    CREATE TABLE sub_agent_invocations (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        agent_tool       TEXT NOT NULL,
        task             TEXT,
        allowed_tools    JSON NOT NULL DEFAULT '[]'
    );

    CREATE INDEX idx_sub_agents_session ON sub_agent_invocations(session_id);

    CREATE TABLE tool_sequences (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES sessions(id),
        sequence         TEXT NOT NULL,
        length           INTEGER NOT NULL,
        all_succeeded    INTEGER NOT NULL
    );

    CREATE INDEX idx_sequences_session ON tool_sequences(session_id);
    CREATE INDEX idx_sequences_text ON tool_sequences(sequence);

    CREATE TABLE session_modes (
        session_id       TEXT PRIMARY KEY REFERENCES sessions(id),
        plan_mode_count  INTEGER NOT NULL DEFAULT 0,
        compact_count    INTEGER NOT NULL DEFAULT 0,
        thinking_count   INTEGER NOT NULL DEFAULT 0,
        sub_agent_count  INTEGER NOT NULL DEFAULT 0
    );

    -- ============================================
    -- Learnings (outlive their source session)
    -- ============================================

    CREATE TABLE learnings (
        id               TEXT PRIMARY KEY,
        session_id       TEXT REFERENCES sessions(id),
        content          TEXT NOT NULL,
        learning_type    TEXT NOT NULL,
        scope            TEXT NOT NULL,
        confidence       REAL NOT NULL DEFAULT 0.5,
        tags             JSON NOT NULL DEFAULT '[]',
        related_files    JSON NOT NULL DEFAULT '[]',
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX idx_learnings_session ON learnings(session_id);
    CREATE INDEX idx_learnings_type ON learnings(learning_type);
    "#,
    // Version 2: Full-text search shadow tables
    //
    // Populated manually alongside the base tables, in the same
    // transaction, so the index can never drift from the data.
    r#"
    CREATE VIRTUAL TABLE events_fts USING fts5(
        content,
        session_id UNINDEXED,
        event_id UNINDEXED
    );

    CREATE VIRTUAL TABLE learnings_fts USING fts5(
        content,
        learning_id UNINDEXED
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at DATETIME NOT NULL
        )",
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

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
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
                [version],
            )?;
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
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
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

        // Exactly one row per version
        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "sessions",
            "events",
            "tool_calls",
            "errors",
            "skill_invocations",
            "sub_agent_invocations",
            "tool_sequences",
            "session_modes",
            "learnings",
            "events_fts",
            "learnings_fts",
            "schema_migrations",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        let fk_list: Vec<(String, String)> = conn
            .prepare("PRAGMA foreign_key_list(events)")
            .unwrap()
            .query_map([], |row| {
                Ok((row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(
            fk_list.iter().any(|(table, _)| table == "sessions"),
            "events should reference sessions"
        );

        let learning_fks: Vec<String> = conn
            .prepare("PRAGMA foreign_key_list(learnings)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(2))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(learning_fks.iter().any(|t| t == "sessions"));
    }
}
