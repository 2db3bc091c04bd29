//! RunOrchestrator: lifecycle of the canonical analysis run for the subject in view.
//!
//! One run per subject at a time. A recent prior run (younger than the
//! staleness window) is never silently rerun; the caller gets a
//! [`StartOutcome::NeedsConfirmation`] and answers via [`RunOrchestrator::confirm`].
//!
//! State is published as [`OrchestratorSnapshot`] over a `watch` channel;
//! front ends subscribe and render, they never mutate.

mod poll;

use crate::config::RunSettings;
use crate::model::{AnalysisRun, RunStatus, Subject};
use crate::providers::RemoteAnalyzer;
use crate::storage::RunStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerunDecision {
    /// Activate the latest run; resume polling it if it is still in flight.
    UseExisting,
    ForceRerun,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The latest run is younger than the staleness window.
    NeedsConfirmation {
        latest: AnalysisRun,
        age: chrono::Duration,
    },
    /// A run for this subject is already in flight; no new run was created.
    AlreadyRunning(AnalysisRun),
    /// A new run reached a terminal state (completed or failed).
    Finished(AnalysisRun),
    /// An existing run was activated instead of starting a new one.
    Reused(AnalysisRun),
    Cancelled,
}

impl StartOutcome {
    pub fn run(&self) -> Option<&AnalysisRun> {
        match self {
            StartOutcome::NeedsConfirmation { latest, .. } => Some(latest),
            StartOutcome::AlreadyRunning(r)
            | StartOutcome::Finished(r)
            | StartOutcome::Reused(r) => Some(r),
            StartOutcome::Cancelled => None,
        }
    }
}

/// Read-only view of the orchestrator for the subject in view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorSnapshot {
    pub subject_id: Option<String>,
    /// Newest first.
    pub history: Vec<AnalysisRun>,
    pub active_run_id: Option<String>,
    pub in_flight: Option<AnalysisRun>,
    pub pending_confirmation: Option<AnalysisRun>,
}

impl OrchestratorSnapshot {
    pub fn active_run(&self) -> Option<&AnalysisRun> {
        let id = self.active_run_id.as_deref()?;
        self.history.iter().find(|r| r.id == id)
    }
}

pub struct RunOrchestrator {
    store: Arc<dyn RunStore>,
    analyzer: Arc<dyn RemoteAnalyzer>,
    settings: RunSettings,
    short_form_max_secs: u32,
    state: watch::Sender<OrchestratorSnapshot>,
}

/// Clears the in-flight slot when a drive ends, including when its future is dropped.
struct InFlightGuard<'a> {
    orch: &'a RunOrchestrator,
    run_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let run_id = &self.run_id;
        self.orch.state.send_if_modified(|s| {
            if s.in_flight.as_ref().is_some_and(|r| &r.id == run_id) {
                s.in_flight = None;
                true
            } else {
                false
            }
        });
    }
}

impl RunOrchestrator {
    pub fn new(
        store: Arc<dyn RunStore>,
        analyzer: Arc<dyn RemoteAnalyzer>,
        settings: RunSettings,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorSnapshot::default());
        Self {
            store,
            analyzer,
            settings,
            short_form_max_secs: 60,
            state,
        }
    }

    pub fn with_short_form_max_secs(mut self, secs: u32) -> Self {
        self.short_form_max_secs = secs;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.state.borrow().clone()
    }

    pub fn history(&self) -> Vec<AnalysisRun> {
        self.state.borrow().history.clone()
    }

    pub fn active_run(&self) -> Option<AnalysisRun> {
        self.state.borrow().active_run().cloned()
    }

    pub fn in_flight(&self) -> Option<AnalysisRun> {
        self.state.borrow().in_flight.clone()
    }

    /// Status of the run currently being driven, if any.
    pub fn status(&self) -> Option<RunStatus> {
        self.state.borrow().in_flight.as_ref().map(|r| r.status)
    }

    /// Loads stored history for `subject_id` and activates its latest completed run.
    pub fn load_history(&self, subject_id: &str) -> anyhow::Result<Vec<AnalysisRun>> {
        self.focus(subject_id);
        let runs = self.store.list_runs(subject_id, self.settings.history_limit)?;
        let active = runs
            .iter()
            .find(|r| r.status == RunStatus::Completed)
            .map(|r| r.id.clone());
        self.state.send_modify(|s| {
            s.history = runs.clone();
            s.active_run_id = active;
        });
        Ok(runs)
    }

    /// Switches which historical run is displayed. Never touches the store.
    pub fn select_run(&self, run_id: &str) -> Option<AnalysisRun> {
        let mut selected = None;
        self.state.send_if_modified(|s| {
            selected = s.history.iter().find(|r| r.id == run_id).cloned();
            if selected.is_some() && s.active_run_id.as_deref() != Some(run_id) {
                s.active_run_id = Some(run_id.to_string());
                true
            } else {
                false
            }
        });
        selected
    }

    pub async fn start(&self, subject: &Subject) -> anyhow::Result<StartOutcome> {
        self.start_at(subject, Utc::now()).await
    }

    /// [`start`](Self::start) with an explicit clock reading for the staleness check.
    pub async fn start_at(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StartOutcome> {
        self.focus(&subject.id);

        if let Some(run) = self.in_flight_for(&subject.id) {
            return Ok(StartOutcome::AlreadyRunning(run));
        }

        if let Some(latest) = self.store.latest_run(&subject.id)? {
            let age = latest.age_at(now);
            if age < self.settings.staleness_window() {
                info!(
                    subject_id = %subject.id,
                    run_id = %latest.id,
                    age_secs = age.num_seconds(),
                    "recent run exists, asking before rerun"
                );
                self.state
                    .send_modify(|s| s.pending_confirmation = Some(latest.clone()));
                return Ok(StartOutcome::NeedsConfirmation { latest, age });
            }
        }

        self.state
            .send_if_modified(|s| s.pending_confirmation.take().is_some());
        self.launch(subject, now).await
    }

    /// Answers a [`StartOutcome::NeedsConfirmation`].
    pub async fn confirm(
        &self,
        subject: &Subject,
        decision: RerunDecision,
    ) -> anyhow::Result<StartOutcome> {
        self.confirm_at(subject, decision, Utc::now()).await
    }

    /// [`confirm`](Self::confirm) with an explicit clock reading for a forced rerun.
    pub async fn confirm_at(
        &self,
        subject: &Subject,
        decision: RerunDecision,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StartOutcome> {
        self.focus(&subject.id);
        self.state.send_if_modified(|s| s.pending_confirmation.take().is_some());

        match decision {
            RerunDecision::Cancel => {
                info!(subject_id = %subject.id, "rerun cancelled");
                Ok(StartOutcome::Cancelled)
            }
            RerunDecision::ForceRerun => {
                if let Some(run) = self.in_flight_for(&subject.id) {
                    return Ok(StartOutcome::AlreadyRunning(run));
                }
                self.launch(subject, now).await
            }
            RerunDecision::UseExisting => {
                let latest = self.store.latest_run(&subject.id)?.ok_or_else(|| {
                    anyhow::anyhow!("no existing run to reuse for subject {}", subject.id)
                })?;
                if latest.is_terminal() {
                    info!(subject_id = %subject.id, run_id = %latest.id, "reusing existing run");
                    self.record(&latest);
                    return Ok(StartOutcome::Reused(latest));
                }
                self.resume(latest).await
            }
        }
    }

    async fn launch(&self, subject: &Subject, now: DateTime<Utc>) -> anyhow::Result<StartOutcome> {
        let format = subject.format_type(self.short_form_max_secs);
        let run = AnalysisRun::pending(subject, format, now);
        let Some(_guard) = self.claim(&run) else {
            return Ok(self
                .in_flight_for(&subject.id)
                .map(StartOutcome::AlreadyRunning)
                .unwrap_or(StartOutcome::Cancelled));
        };

        let span = info_span!("analysis.run", run_id = %run.id, subject_id = %run.subject_id);
        let finished = poll::execute_impl(self, run).instrument(span).await?;
        self.record(&finished);
        Ok(StartOutcome::Finished(finished))
    }

    /// Attaches to a run started elsewhere (another session or worker) and polls it.
    async fn resume(&self, run: AnalysisRun) -> anyhow::Result<StartOutcome> {
        let Some(_guard) = self.claim(&run) else {
            return Ok(self
                .in_flight_for(&run.subject_id)
                .map(StartOutcome::AlreadyRunning)
                .unwrap_or(StartOutcome::Cancelled));
        };
        info!(run_id = %run.id, status = %run.status, "resuming in-flight run");

        let span = info_span!("analysis.run", run_id = %run.id, subject_id = %run.subject_id);
        let finished = poll::poll_impl(self, &run.id).instrument(span).await?;
        self.record(&finished);
        Ok(StartOutcome::Reused(finished))
    }

    /// Takes the in-flight slot for `run`, or returns `None` if it is occupied.
    fn claim(&self, run: &AnalysisRun) -> Option<InFlightGuard<'_>> {
        let mut claimed = false;
        self.state.send_if_modified(|s| {
            if s.in_flight.is_some() {
                return false;
            }
            s.in_flight = Some(run.clone());
            claimed = true;
            true
        });
        claimed.then(|| InFlightGuard {
            orch: self,
            run_id: run.id.clone(),
        })
    }

    fn in_flight_for(&self, subject_id: &str) -> Option<AnalysisRun> {
        self.state
            .borrow()
            .in_flight
            .as_ref()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
    }

    pub(crate) fn publish_in_flight(&self, run: &AnalysisRun) {
        self.state.send_if_modified(|s| match &mut s.in_flight {
            Some(current) if current.id == run.id && current != run => {
                *current = run.clone();
                true
            }
            _ => false,
        });
    }

    /// Resets per-subject state when the view moves to another subject.
    fn focus(&self, subject_id: &str) {
        self.state.send_if_modified(|s| {
            if s.subject_id.as_deref() == Some(subject_id) {
                return false;
            }
            *s = OrchestratorSnapshot {
                subject_id: Some(subject_id.to_string()),
                ..OrchestratorSnapshot::default()
            };
            true
        });
    }

    /// Puts a finished run at the head of history and makes it active.
    /// Results for a subject no longer in view are dropped.
    fn record(&self, run: &AnalysisRun) {
        let limit = self.settings.history_limit;
        self.state.send_if_modified(|s| {
            if s.subject_id.as_deref() != Some(run.subject_id.as_str()) {
                return false;
            }
            s.history.retain(|r| r.id != run.id);
            s.history.insert(0, run.clone());
            s.history
                .sort_by(|a, b| b.started_at.cmp(&a.started_at));
            s.history.truncate(limit);
            s.active_run_id = Some(run.id.clone());
            true
        });
    }
}
