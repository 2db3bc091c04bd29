use super::OutputFormat;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Subject JSON file (id, title, duration_secs, ...)
    #[arg(long)]
    pub subject: PathBuf,

    /// Rerun even if a recent run exists
    #[arg(long, conflicts_with = "reuse")]
    pub force: bool,

    /// Show the most recent run instead of starting a new one when it is still fresh
    #[arg(long)]
    pub reuse: bool,

    /// Run database (overrides store.path from config)
    #[arg(long, env = "QUANTA_DB")]
    pub db: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}
