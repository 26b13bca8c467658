use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use macrofetch_core::{
    Catalog, CollectionOrchestrator, CollectionRequest, CollectorConfig, CombinedDataset,
    ConfigError, DatasetSink, FetcherRegistryBuilder, ObservationDate, PersistedArtifact,
    RunOutcome, RunStamp, SinkError, SourceDataset, SourceSelection,
};
use macrofetch_warehouse::{load_catalog, Warehouse, WarehouseConfig};
use tracing::info;

use crate::cli::CollectArgs;
use crate::commands::NO_DATA_EXIT;
use crate::error::CliError;
use crate::output;

pub async fn run(
    args: &CollectArgs,
    mut config: CollectorConfig,
    pretty: bool,
) -> Result<ExitCode, CliError> {
    apply_overrides(&mut config, args)?;
    let request = CollectionRequest {
        sources: SourceSelection::parse(&args.sources),
        start: args.start.as_deref().map(ObservationDate::parse).transpose()?,
        end: args.end.as_deref().map(ObservationDate::parse).transpose()?,
    };

    let catalog = load_catalog(&config.catalog_path, config.catalog_explicit)?;
    let mut registry = FetcherRegistryBuilder::from_config(&config);
    if args.mock {
        registry = registry.with_mock_mode();
    }
    let registry = Arc::new(registry.build());

    let warehouse = Arc::new(Warehouse::open(WarehouseConfig::from_collector_config(
        &config,
    ))?);
    let sink: Arc<dyn DatasetSink> = if args.no_upload {
        Arc::new(ArtifactsOnly(warehouse))
    } else {
        warehouse as Arc<dyn DatasetSink>
    };

    let orchestrator = CollectionOrchestrator::from_config(&config, registry, sink);
    let outcome = orchestrator.run(&request, &catalog).await?;
    output::render(outcome.report(), pretty)?;

    match outcome {
        RunOutcome::Completed(report) => {
            info!(run_id = %report.stamp.run_id, rows = report.combined_rows, "collect finished");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::NoData(_) => Ok(ExitCode::from(NO_DATA_EXIT)),
    }
}

/// Writes flag values over the environment-derived config.
fn apply_overrides(config: &mut CollectorConfig, args: &CollectArgs) -> Result<(), ConfigError> {
    if let Some(data_dir) = &args.data_dir {
        config.raw_dir = data_dir.join("raw");
        config.db_path = data_dir.join("macrofetch.duckdb");
        if !config.catalog_explicit {
            config.catalog_path = data_dir.join("symbols.csv");
        }
        config.data_dir = data_dir.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.catalog_path = catalog.clone();
        config.catalog_explicit = true;
    }
    if let Some(max_workers) = args.max_workers {
        config.max_workers = positive("--max-workers", max_workers)?;
    }
    if let Some(source_workers) = args.source_workers {
        config.source_workers = positive("--source-workers", source_workers)?;
    }
    if let Some(max_retries) = args.max_retries {
        config.retry.max_retries = max_retries;
    }
    if let Some(seconds) = args.base_wait_secs {
        config.set_base_wait(Duration::from_secs(seconds));
    }
    Ok(())
}

fn positive(flag: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: flag.to_owned(),
            value: value.to_string(),
            reason: String::from("must be at least 1"),
        });
    }
    Ok(value)
}

/// Persists artifacts through the warehouse but never uploads to its tables.
struct ArtifactsOnly(Arc<Warehouse>);

impl DatasetSink for ArtifactsOnly {
    fn persist_source(
        &self,
        dataset: &SourceDataset,
        stamp: &RunStamp,
    ) -> Result<PersistedArtifact, SinkError> {
        self.0.persist_source(dataset, stamp)
    }

    fn persist_combined(
        &self,
        combined: &CombinedDataset,
        stamp: &RunStamp,
    ) -> Result<Vec<PersistedArtifact>, SinkError> {
        self.0.persist_combined(combined, stamp)
    }

    fn publish(&self, combined: &CombinedDataset, _catalog: &Catalog) -> Result<(), SinkError> {
        info!(rows = combined.len(), "upload skipped");
        Ok(())
    }
}
