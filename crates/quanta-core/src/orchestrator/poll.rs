//! Remote execution and the bounded poll loop for one run.

use super::RunOrchestrator;
use crate::errors::StoreError;
use crate::model::{AnalysisRun, FailureKind, RunFailure, RunResult, RunStatus, RunTransition};
use crate::providers::AnalyzerAck;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Creates the record, fires the analyzer and waits for a terminal state.
pub(crate) async fn execute_impl(
    orch: &RunOrchestrator,
    run: AnalysisRun,
) -> anyhow::Result<AnalysisRun> {
    orch.store.create_run(&run)?;
    orch.publish_in_flight(&run);

    let running = orch
        .store
        .update_run(&run.id, &RunTransition::Running, Utc::now())?;
    orch.publish_in_flight(&running);
    info!(run_id = %run.id, subject_id = %run.subject_id, "analysis run started");

    let transition = match orch.analyzer.invoke(&run.id, &run.input_snapshot).await {
        Err(e) => {
            warn!(run_id = %run.id, error = %e, "analyzer invocation failed");
            RunTransition::Failed(RunFailure::new(FailureKind::Invocation, e.to_string()))
        }
        Ok(AnalyzerAck::Rejected(msg)) => {
            warn!(run_id = %run.id, error = %msg, "analyzer rejected run");
            RunTransition::Failed(RunFailure::new(FailureKind::Invocation, msg))
        }
        Ok(AnalyzerAck::Failed(msg)) => {
            RunTransition::Failed(RunFailure::new(FailureKind::Remote, msg))
        }
        Ok(AnalyzerAck::Completed(result)) => completed_or_invalid(result),
        Ok(AnalyzerAck::Queued) => {
            debug!(run_id = %run.id, "analysis queued remotely, polling");
            return poll_impl(orch, &run.id).await;
        }
    };

    terminate_impl(orch, &run.id, transition)
}

fn completed_or_invalid(result: RunResult) -> RunTransition {
    let out_of_range = result.overall_score > 100
        || result.confidence_score > 100
        || result.categories.values().any(|c| c.score > 100);
    if out_of_range {
        RunTransition::Failed(RunFailure::new(
            FailureKind::Remote,
            "analyzer returned a score outside 0..=100",
        ))
    } else {
        RunTransition::Completed(result)
    }
}

/// Re-reads the run every `poll_interval` until it is terminal or attempts run out.
///
/// The record may be completed by someone else at any time; this loop only
/// writes when it gives up.
pub(crate) async fn poll_impl(orch: &RunOrchestrator, run_id: &str) -> anyhow::Result<AnalysisRun> {
    let interval = orch.settings.poll_interval();
    let max_attempts = orch.settings.max_poll_attempts;

    for attempt in 1..=max_attempts {
        tokio::time::sleep(interval).await;

        let run = match orch.store.get_run(run_id) {
            Ok(run) => run,
            Err(e) => {
                warn!(run_id, attempt, error = %e, "poll read failed");
                continue;
            }
        };
        orch.publish_in_flight(&run);

        match run.status {
            RunStatus::Completed => {
                info!(run_id, attempt, score = ?run.overall_score(), "analysis completed");
                return Ok(run);
            }
            RunStatus::Failed => {
                warn!(run_id, attempt, error = ?run.error_message(), "analysis failed remotely");
                return Ok(run);
            }
            RunStatus::Pending | RunStatus::Running => {
                debug!(
                    run_id,
                    attempt,
                    max_attempts,
                    status = %run.status,
                    "analysis still running"
                );
            }
        }
    }

    warn!(
        run_id,
        max_attempts,
        interval_ms = orch.settings.poll_interval_ms,
        "analysis poll timed out"
    );
    terminate_impl(
        orch,
        run_id,
        RunTransition::Failed(RunFailure::timeout(
            max_attempts,
            orch.settings.poll_interval_ms,
        )),
    )
}

/// Writes a terminal transition. If another writer got there first, theirs stands.
pub(crate) fn terminate_impl(
    orch: &RunOrchestrator,
    run_id: &str,
    transition: RunTransition,
) -> anyhow::Result<AnalysisRun> {
    match orch.store.update_run(run_id, &transition, Utc::now()) {
        Ok(run) => {
            if let Some(f) = &run.failure {
                info!(run_id, kind = f.kind.as_str(), error = %f.message, "analysis run failed");
            } else {
                info!(run_id, score = ?run.overall_score(), "analysis run completed");
            }
            Ok(run)
        }
        Err(StoreError::TerminalRun { status, .. }) => {
            debug!(run_id, %status, "run already terminal, keeping existing outcome");
            Ok(orch.store.get_run(run_id)?)
        }
        Err(e) => Err(e.into()),
    }
}
