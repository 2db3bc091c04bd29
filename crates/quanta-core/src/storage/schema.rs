//! SQLite schema for analysis run history.
//!
//! Tables:
//! - `analysis_runs`: one row per run; terminal rows are never updated again

use rusqlite::Connection;
use std::collections::HashSet;

/// DDL for the run history table.
///
/// Schema version: 2 (v1 had no `failure_kind`)
pub const RUN_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_runs (
    seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
    id                   TEXT NOT NULL UNIQUE,
    subject_id           TEXT NOT NULL,
    status               TEXT NOT NULL,
    format_type          TEXT NOT NULL,
    started_at           TEXT NOT NULL,
    completed_at         TEXT,
    input_snapshot_json  TEXT NOT NULL,
    overall_score        INTEGER,
    confidence_score     INTEGER,
    breakdown_json       TEXT,
    error_message        TEXT,
    failure_kind         TEXT
);

CREATE INDEX IF NOT EXISTS idx_analysis_runs_subject_started
    ON analysis_runs(subject_id, started_at DESC);
"#;

pub(crate) fn init_connection_impl(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for file-backed DBs (no-op for in-memory)
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL");
    conn.execute_batch(RUN_SCHEMA)?;
    migrate_v2_impl(conn)
}

pub(crate) fn migrate_v2_impl(conn: &Connection) -> rusqlite::Result<()> {
    let cols = get_columns_impl(conn, "analysis_runs")?;
    add_column_if_missing_impl(conn, &cols, "analysis_runs", "failure_kind", "TEXT")
}

pub(crate) fn get_columns_impl(
    conn: &Connection,
    table: &str,
) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

pub(crate) fn add_column_if_missing_impl(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> rusqlite::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}
