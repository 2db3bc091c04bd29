use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config;
    match cli.cmd {
        Command::Analyze(args) => super::analyze::run(args, &config).await,
        Command::History(args) => super::history::run(args, &config),
        Command::Board(args) => super::board::run(args, &config).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
