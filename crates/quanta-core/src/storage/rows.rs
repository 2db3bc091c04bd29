use crate::errors::StoreError;
use crate::model::{
    AnalysisRun, CategoryBreakdown, FailureKind, FormatType, InputSnapshot, RunFailure, RunResult,
    RunStatus,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

pub(crate) const RUN_COLUMNS: &str = "id, subject_id, status, format_type, started_at, \
     completed_at, input_snapshot_json, overall_score, confidence_score, breakdown_json, \
     error_message, failure_kind";

/// Raw `analysis_runs` row before validation.
#[derive(Debug, Clone)]
pub(crate) struct RunRow {
    pub id: String,
    pub subject_id: String,
    pub status: String,
    pub format_type: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub input_snapshot_json: String,
    pub overall_score: Option<i64>,
    pub confidence_score: Option<i64>,
    pub breakdown_json: Option<String>,
    pub error_message: Option<String>,
    pub failure_kind: Option<String>,
}

pub(crate) fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        status: row.get(2)?,
        format_type: row.get(3)?,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        input_snapshot_json: row.get(6)?,
        overall_score: row.get(7)?,
        confidence_score: row.get(8)?,
        breakdown_json: row.get(9)?,
        error_message: row.get(10)?,
        failure_kind: row.get(11)?,
    })
}

/// Fixed-width timestamps so `ORDER BY started_at` sorts chronologically.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(id: &str, field: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(id, format!("invalid {field} timestamp: {e}")))
}

fn corrupt(id: &str, detail: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        id: id.to_string(),
        detail: detail.into(),
    }
}

fn score(id: &str, field: &str, v: Option<i64>) -> Result<u8, StoreError> {
    let v = v.ok_or_else(|| corrupt(id, format!("completed run missing {field}")))?;
    u8::try_from(v)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or_else(|| corrupt(id, format!("{field} out of range: {v}")))
}

impl RunRow {
    pub(crate) fn into_run(self) -> Result<AnalysisRun, StoreError> {
        let id = self.id;
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| corrupt(&id, format!("unknown status '{}'", self.status)))?;
        let format_type = FormatType::parse(&self.format_type)
            .ok_or_else(|| corrupt(&id, format!("unknown format '{}'", self.format_type)))?;
        let started_at = parse_ts(&id, "started_at", &self.started_at)?;
        let completed_at = match self.completed_at.as_deref() {
            Some(s) => Some(parse_ts(&id, "completed_at", s)?),
            None => None,
        };
        let input_snapshot: InputSnapshot = serde_json::from_str(&self.input_snapshot_json)
            .map_err(|e| corrupt(&id, format!("invalid input snapshot: {e}")))?;

        let result = if status == RunStatus::Completed {
            let categories: BTreeMap<String, CategoryBreakdown> = match self.breakdown_json {
                Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
                    .map_err(|e| corrupt(&id, format!("invalid breakdown: {e}")))?,
                _ => BTreeMap::new(),
            };
            Some(RunResult {
                overall_score: score(&id, "overall_score", self.overall_score)?,
                confidence_score: score(&id, "confidence_score", self.confidence_score)?,
                categories,
            })
        } else {
            None
        };

        let failure = if status == RunStatus::Failed {
            // v1 rows predate failure_kind; those were all remote-reported.
            let kind = self
                .failure_kind
                .as_deref()
                .and_then(FailureKind::parse)
                .unwrap_or(FailureKind::Remote);
            Some(RunFailure {
                kind,
                message: self.error_message.unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(AnalysisRun {
            id,
            subject_id: self.subject_id,
            status,
            format_type,
            started_at,
            completed_at,
            input_snapshot,
            result,
            failure,
        })
    }
}
