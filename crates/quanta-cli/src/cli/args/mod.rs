use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod analyze;
pub mod board;
pub mod common;
pub mod history;
pub use analyze::*;
pub use board::*;
pub use common::*;
pub use history::*;

#[derive(Parser, Debug)]
#[command(
    name = "quanta",
    version,
    about = "Run content analyses and score subjects across independent engines"
)]
pub struct Cli {
    /// Config file (YAML). Defaults apply when it does not exist.
    #[arg(
        long,
        global = true,
        default_value = "quanta.yaml",
        env = "QUANTA_CONFIG"
    )]
    pub config: PathBuf,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start (or reuse) the canonical analysis run for a subject
    Analyze(AnalyzeArgs),
    /// List stored analysis runs for a subject, newest first
    History(HistoryArgs),
    /// Score a subject with the independent engines and print the composite
    Board(BoardArgs),
    Version,
}
