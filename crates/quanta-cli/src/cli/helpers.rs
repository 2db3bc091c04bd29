use anyhow::Context;
use quanta_core::model::AnalysisRun;
use quanta_core::{QuantaConfig, SqliteRunStore, Subject};
use std::path::Path;

pub fn load_config(path: &Path) -> anyhow::Result<QuantaConfig> {
    QuantaConfig::load_or_default(path)
}

pub fn load_subject(path: &Path) -> anyhow::Result<Subject> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read subject file '{}'", path.display()))?;
    let subject: Subject = serde_json::from_str(&raw)
        .with_context(|| format!("invalid subject JSON in '{}'", path.display()))?;
    if subject.id.trim().is_empty() {
        anyhow::bail!("subject in '{}' has an empty id", path.display());
    }
    Ok(subject)
}

pub fn open_store(cfg: &QuantaConfig, db: Option<&Path>) -> anyhow::Result<SqliteRunStore> {
    let path = db.unwrap_or(&cfg.store.path);
    SqliteRunStore::open(path)
        .with_context(|| format!("failed to open run store '{}'", path.display()))
}

/// One line per run: id, status, score or error, start time.
pub fn run_line(run: &AnalysisRun) -> String {
    let outcome = match (run.overall_score(), run.error_message()) {
        (Some(score), _) => format!("score {:>3}", score),
        (None, Some(err)) => format!("error: {}", err),
        (None, None) => "-".to_string(),
    };
    format!(
        "{}  {:<9}  {:<10}  {}  {}",
        run.id,
        run.status.as_str(),
        run.format_type.as_str(),
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        outcome
    )
}

pub fn print_run_detail(run: &AnalysisRun) {
    println!("run      {}", run.id);
    println!("subject  {}", run.subject_id);
    println!("status   {}", run.status);
    println!("started  {}", run.started_at.to_rfc3339());
    if let Some(done) = run.completed_at {
        println!("finished {}", done.to_rfc3339());
    }
    if let Some(result) = &run.result {
        println!(
            "overall  {}  (confidence {})",
            result.overall_score, result.confidence_score
        );
        for (name, cat) in &result.categories {
            println!("  {:<16} {:>3}", name, cat.score);
            for rec in &cat.recommendations {
                println!("    - {}", rec);
            }
        }
    }
    if let Some(failure) = &run.failure {
        println!("failure  [{}] {}", failure.kind.as_str(), failure.message);
        if failure.kind.suggests_retry() {
            println!("         rerun with --force to try again");
        }
    }
}
