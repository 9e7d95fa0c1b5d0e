mod action_host;
mod bootstrap_helpers;
mod startup_dispatch;

use std::process::ExitCode;

use clap::Parser;
use herald_cli::Cli;

use crate::action_host::{report_failure, write_outputs};
use crate::bootstrap_helpers::init_tracing;
use crate::startup_dispatch::run_cli;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let output_path = cli.output_path.clone();
    let mut stdout = std::io::stdout();

    let result = match run_cli(cli).await {
        Ok(outcome) => write_outputs(output_path.as_deref(), &outcome, &mut stdout),
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_failure(&error, &mut stdout);
            ExitCode::FAILURE
        }
    }
}
