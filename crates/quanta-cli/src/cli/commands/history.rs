use crate::cli::args::{HistoryArgs, OutputFormat};
use crate::cli::helpers::{load_config, open_store, run_line};
use crate::exit_codes::SUCCESS;
use quanta_core::RunStore;
use std::path::Path;

pub fn run(args: HistoryArgs, config: &Path) -> anyhow::Result<i32> {
    let cfg = load_config(config)?;
    let store = open_store(&cfg, args.db.as_deref())?;
    let limit = args.limit.unwrap_or(cfg.run.history_limit);
    let runs = store.list_runs(&args.subject_id, limit)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&runs)?),
        OutputFormat::Text if runs.is_empty() => {
            println!("no runs for subject {}", args.subject_id)
        }
        OutputFormat::Text => {
            for run in &runs {
                println!("{}", run_line(run));
            }
        }
    }
    Ok(SUCCESS)
}
