use crate::cli::args::{AnalyzeArgs, OutputFormat};
use crate::cli::helpers::{load_config, load_subject, open_store, print_run_detail};
use crate::exit_codes::{NEEDS_CONFIRMATION, RUN_FAILED, SUCCESS};
use quanta_core::providers::HttpAnalyzer;
use quanta_core::{RerunDecision, RunOrchestrator, RunStatus, StartOutcome};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub async fn run(args: AnalyzeArgs, config: &Path) -> anyhow::Result<i32> {
    let cfg = load_config(config)?;
    let subject = load_subject(&args.subject)?;
    let store = Arc::new(open_store(&cfg, args.db.as_deref())?);
    let analyzer = Arc::new(HttpAnalyzer::from_settings(&cfg.endpoints)?);

    let orch = RunOrchestrator::new(store, analyzer, cfg.run.clone())
        .with_short_form_max_secs(cfg.board.short_form_max_secs);
    orch.load_history(&subject.id)?;

    let progress = tokio::spawn(log_progress(orch.subscribe()));

    let mut outcome = orch.start(&subject).await?;
    if let StartOutcome::NeedsConfirmation { latest, age } = &outcome {
        let decision = if args.force {
            Some(RerunDecision::ForceRerun)
        } else if args.reuse {
            Some(RerunDecision::UseExisting)
        } else {
            None
        };
        match decision {
            Some(d) => outcome = orch.confirm(&subject, d).await?,
            None => {
                eprintln!(
                    "subject {} was analyzed {}s ago (run {}, {}). \
                     Pass --reuse to show it or --force to rerun.",
                    subject.id,
                    age.num_seconds(),
                    latest.id,
                    latest.status
                );
                progress.abort();
                return Ok(NEEDS_CONFIRMATION);
            }
        }
    }
    progress.abort();

    let Some(run) = outcome.run().cloned() else {
        return Ok(SUCCESS);
    };
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => print_run_detail(&run),
    }

    Ok(match run.status {
        RunStatus::Failed => RUN_FAILED,
        _ => SUCCESS,
    })
}

async fn log_progress(mut rx: watch::Receiver<quanta_core::OrchestratorSnapshot>) {
    let mut last = None;
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().in_flight.as_ref().map(|r| r.status);
        if status.is_some() && status != last {
            info!(status = ?status, "analysis progress");
        }
        last = status;
    }
}
