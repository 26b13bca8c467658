use std::process::ExitCode;

use macrofetch_core::CollectorConfig;
use macrofetch_warehouse::load_catalog;

use crate::cli::CatalogArgs;
use crate::error::CliError;
use crate::output;

pub fn run(args: &CatalogArgs, config: &CollectorConfig, pretty: bool) -> Result<ExitCode, CliError> {
    let catalog = match &args.catalog {
        Some(path) => load_catalog(path, true)?,
        None => load_catalog(&config.catalog_path, config.catalog_explicit)?,
    };
    output::render(&catalog.summary(), pretty)?;
    Ok(ExitCode::SUCCESS)
}
