//! Domain records shared by the run orchestrator, the engine board and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The content item being analyzed, as currently edited by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub duration_secs: u32,
}

impl Subject {
    /// Classifies the subject; anything up to `short_form_max_secs` counts as short-form.
    pub fn format_type(&self, short_form_max_secs: u32) -> FormatType {
        if self.duration_secs <= short_form_max_secs {
            FormatType::ShortForm
        } else {
            FormatType::LongForm
        }
    }

    /// Freezes the analyzable fields so a run keeps what it saw.
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            view_count: self.view_count,
            like_count: self.like_count,
            comment_count: self.comment_count,
            duration_secs: self.duration_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    ShortForm,
    LongForm,
}

impl FormatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatType::ShortForm => "short_form",
            FormatType::LongForm => "long_form",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short_form" => Some(FormatType::ShortForm),
            "long_form" => Some(FormatType::LongForm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

/// Output of a completed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub overall_score: u8,
    pub confidence_score: u8,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryBreakdown>,
}

/// Why a run ended `failed`. Callers branch on the kind, not on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The remote call was rejected before any job existed.
    Invocation,
    /// The job ran remotely and reported failure.
    Remote,
    /// The poll loop gave up without seeing a terminal status.
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Invocation => "invocation",
            FailureKind::Remote => "remote",
            FailureKind::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invocation" => Some(FailureKind::Invocation),
            "remote" => Some(FailureKind::Remote),
            "timeout" => Some(FailureKind::Timeout),
            _ => None,
        }
    }

    /// Timeouts are worth retrying as-is; the other kinds carry a detail worth reading first.
    pub fn suggests_retry(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Invocation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(attempts: u32, interval_ms: u64) -> Self {
        let total_ms = u64::from(attempts).saturating_mul(interval_ms);
        Self::new(
            FailureKind::Timeout,
            format!(
                "analysis timed out after {} polls ({}ms)",
                attempts, total_ms
            ),
        )
    }
}

/// One persisted analysis attempt.
///
/// `result` is present only when `status` is `completed`, `failure` only when it
/// is `failed`. Once terminal the record never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: String,
    pub subject_id: String,
    pub status: RunStatus,
    pub format_type: FormatType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_snapshot: InputSnapshot,
    pub result: Option<RunResult>,
    pub failure: Option<RunFailure>,
}

impl AnalysisRun {
    /// A fresh `pending` record for `subject`.
    pub fn pending(subject: &Subject, format_type: FormatType, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject.id.clone(),
            status: RunStatus::Pending,
            format_type,
            started_at,
            completed_at: None,
            input_snapshot: subject.snapshot(),
            result: None,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    pub fn overall_score(&self) -> Option<u8> {
        self.result.as_ref().map(|r| r.overall_score)
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.started_at)
    }
}

/// A status change applied to a stored run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTransition {
    Running,
    Completed(RunResult),
    Failed(RunFailure),
}

impl RunTransition {
    pub fn status(&self) -> RunStatus {
        match self {
            RunTransition::Running => RunStatus::Running,
            RunTransition::Completed(_) => RunStatus::Completed,
            RunTransition::Failed(_) => RunStatus::Failed,
        }
    }
}

/// Latest score an engine produced for the subject in view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine_key: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_label: Option<String>,
    pub scored_at: DateTime<Utc>,
}
