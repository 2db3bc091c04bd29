//! SqliteRunStore: SQLite-backed analysis run history.
//!
//! Terminal rows are immutable: every transition is guarded in SQL by the
//! current status, so a late writer can never reopen or overwrite a
//! completed/failed run.

use super::rows::{format_ts, read_run_row, RUN_COLUMNS};
use super::schema::init_connection_impl;
use super::RunStore;
use crate::errors::StoreError;
use crate::model::{AnalysisRun, RunStatus, RunTransition};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct SqliteRunStore {
    pub conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!(
                        "failed to create store directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_connection_impl(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_run_in(conn: &Connection, id: &str) -> Result<Option<AnalysisRun>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM analysis_runs WHERE id = ?1"),
                params![id],
                read_run_row,
            )
            .optional()?;
        row.map(|r| r.into_run()).transpose()
    }
}

impl RunStore for SqliteRunStore {
    fn create_run(&self, run: &AnalysisRun) -> Result<String, StoreError> {
        let snapshot = serde_json::to_string(&run.input_snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_runs(
                 id, subject_id, status, format_type, started_at, input_snapshot_json
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.id,
                run.subject_id,
                run.status.as_str(),
                run.format_type.as_str(),
                format_ts(run.started_at),
                snapshot,
            ],
        )?;
        Ok(run.id.clone())
    }

    fn update_run(
        &self,
        id: &str,
        transition: &RunTransition,
        at: DateTime<Utc>,
    ) -> Result<AnalysisRun, StoreError> {
        let conn = self.conn.lock().unwrap();

        let changed = match transition {
            RunTransition::Running => conn.execute(
                "UPDATE analysis_runs SET status = 'running'
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                params![id],
            )?,
            RunTransition::Completed(result) => {
                let breakdown = serde_json::to_string(&result.categories)?;
                conn.execute(
                    "UPDATE analysis_runs
                     SET status = 'completed', completed_at = ?2, overall_score = ?3,
                         confidence_score = ?4, breakdown_json = ?5
                     WHERE id = ?1 AND status IN ('pending', 'running')",
                    params![
                        id,
                        format_ts(at),
                        i64::from(result.overall_score),
                        i64::from(result.confidence_score),
                        breakdown,
                    ],
                )?
            }
            RunTransition::Failed(failure) => conn.execute(
                "UPDATE analysis_runs
                 SET status = 'failed', completed_at = ?2, error_message = ?3, failure_kind = ?4
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                params![id, format_ts(at), failure.message, failure.kind.as_str()],
            )?,
        };

        let current = Self::get_run_in(&conn, id)?.ok_or_else(|| StoreError::RunNotFound {
            id: id.to_string(),
        })?;

        if changed == 0 {
            return Err(StoreError::TerminalRun {
                id: id.to_string(),
                status: current.status,
            });
        }
        Ok(current)
    }

    fn list_runs(&self, subject_id: &str, limit: usize) -> Result<Vec<AnalysisRun>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM analysis_runs
             WHERE subject_id = ?1
             ORDER BY started_at DESC, seq DESC
             LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![subject_id, limit], read_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|r| r.into_run()).collect()
    }

    fn get_run(&self, id: &str) -> Result<AnalysisRun, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::get_run_in(&conn, id)?.ok_or_else(|| StoreError::RunNotFound { id: id.to_string() })
    }
}
