use super::OutputFormat;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct BoardArgs {
    /// Subject JSON file
    #[arg(long)]
    pub subject: PathBuf,

    /// Engine key to run; repeatable. Without it every applicable engine runs.
    #[arg(long = "engine", value_name = "KEY")]
    pub engines: Vec<String>,

    /// Print the engine table and exit without invoking anything
    #[arg(long)]
    pub list: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}
