use crate::cli::args::{BoardArgs, OutputFormat};
use crate::cli::helpers::{load_config, load_subject};
use crate::exit_codes::SUCCESS;
use quanta_core::providers::HttpEngineClient;
use quanta_core::{EngineBoard, EngineRegistry, EngineRunOutcome, EngineState};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::warn;

pub async fn run(args: BoardArgs, config: &Path) -> anyhow::Result<i32> {
    let cfg = load_config(config)?;
    let subject = load_subject(&args.subject)?;
    let registry = EngineRegistry::default();

    if args.list {
        let format = subject.format_type(cfg.board.short_form_max_secs);
        for e in registry.all() {
            let mark = if e.applies_to(format) { "*" } else { " " };
            println!("{} {:<12} {}", mark, e.key, e.name);
        }
        return Ok(SUCCESS);
    }

    let client = Arc::new(HttpEngineClient::from_settings(&cfg.endpoints)?);
    let board = EngineBoard::new(registry, client, cfg.board.clone());
    board.open(subject);

    let outcomes = if args.engines.is_empty() {
        board.run_all_remaining().join_all().await
    } else {
        let mut tasks = JoinSet::new();
        for key in args.engines.clone() {
            let board = board.clone();
            tasks.spawn(async move { board.run(&key).await });
        }
        let mut out = Vec::new();
        while let Some(res) = tasks.join_next().await {
            out.push(res??);
        }
        out
    };
    for o in &outcomes {
        if let EngineRunOutcome::Failed { engine_key, message } = o {
            warn!(engine = %engine_key, error = %message, "engine did not score");
        }
    }

    let state = board.snapshot();
    let composite = board.composite();
    match args.format {
        OutputFormat::Json => {
            let out = json!({
                "subject_id": state.subject.as_ref().map(|s| s.id.clone()),
                "results": state.results,
                "errors": state.last_errors,
                "composite": composite,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for engine in &state.applicable {
                let cell = match state.engine_state(&engine.key) {
                    EngineState::Scored(r) => match r.status_label {
                        Some(label) => format!("{:>3}  {}", r.score, label),
                        None => format!("{:>3}", r.score),
                    },
                    EngineState::Loading => "...".to_string(),
                    EngineState::NotRun => match state.last_errors.get(&engine.key) {
                        Some(err) => format!("  -  {}", err),
                        None => "  -".to_string(),
                    },
                };
                println!("{:<24} {}", engine.name, cell);
            }
            let score = composite
                .score
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let grade = composite.grade.map_or("-", |g| g.as_str());
            println!(
                "composite {} ({}), {}/{} engines",
                score, grade, composite.completed, composite.applicable
            );
            if !composite.weak_engines.is_empty() {
                println!("weak: {}", composite.weak_engines.join(", "));
            }
        }
    }
    Ok(SUCCESS)
}
