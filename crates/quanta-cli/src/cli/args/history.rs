use super::OutputFormat;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Subject id
    pub subject_id: String,

    /// Maximum runs to show (defaults to run.history_limit)
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, env = "QUANTA_DB")]
    pub db: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}
