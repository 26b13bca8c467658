mod catalog;
mod collect;
mod sources;

use std::process::ExitCode;

use macrofetch_core::CollectorConfig;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Exit status of a run that finished without collecting a single row.
pub const NO_DATA_EXIT: u8 = 3;

pub async fn run(cli: &Cli, config: CollectorConfig) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Collect(args) => collect::run(args, config, cli.pretty).await,
        Command::Sources(args) => sources::run(args, &config, cli.pretty),
        Command::Catalog(args) => catalog::run(args, &config, cli.pretty),
    }
}
