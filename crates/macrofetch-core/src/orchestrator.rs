//! Per-run fan-out across sources and the hand-off to persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::normalizer;
use crate::{
    Catalog, CollectorConfig, CollectorSettings, CombinedDataset, CoreError, DatasetSink,
    DateRange, FailedSymbol, FetcherRegistry, ObservationDate, PersistedArtifact,
    RateLimiterSet, RunStamp, SourceCollection, SourceCollector, SourceDataset, SourceId,
    SourceSummary, ValidationError,
};

/// Which sources a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceSelection {
    /// Every registered source.
    #[default]
    All,
    /// Names as given by the caller; validated before the run starts.
    Only(Vec<String>),
}

impl SourceSelection {
    /// Parses `all` or a comma separated list of names.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        Self::Only(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRequest {
    pub sources: SourceSelection,
    /// Falls back to the per-source default start date.
    pub start: Option<ObservationDate>,
    /// Falls back to today (UTC).
    pub end: Option<ObservationDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Collection,
    Persistence,
}

/// A source that contributed nothing because its collection or its write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub stage: FailureStage,
    pub message: String,
}

/// Everything a run produced, whether or not any data came back.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stamp: RunStamp,
    pub sources: Vec<SourceId>,
    pub summaries: Vec<SourceSummary>,
    pub failed_symbols: Vec<FailedSymbol>,
    pub source_failures: Vec<SourceFailure>,
    pub artifacts: Vec<PersistedArtifact>,
    pub columns: Vec<String>,
    pub combined_rows: usize,
    pub duplicates_dropped: usize,
    /// Set when the upload step failed; the files on disk are still valid.
    pub publish_error: Option<String>,
    #[serde(skip)]
    pub datasets: BTreeMap<SourceId, SourceDataset>,
    #[serde(skip)]
    pub combined: CombinedDataset,
}

impl RunReport {
    fn new(stamp: RunStamp, sources: Vec<SourceId>) -> Self {
        Self {
            stamp,
            sources,
            summaries: Vec::new(),
            failed_symbols: Vec::new(),
            source_failures: Vec::new(),
            artifacts: Vec::new(),
            columns: Vec::new(),
            combined_rows: 0,
            duplicates_dropped: 0,
            publish_error: None,
            datasets: BTreeMap::new(),
            combined: CombinedDataset::default(),
        }
    }

    pub fn dataset(&self, source: SourceId) -> Option<&SourceDataset> {
        self.datasets.get(&source)
    }

    /// Sources whose dataset holds at least one row.
    pub fn sources_with_data(&self) -> Vec<SourceId> {
        self.datasets
            .iter()
            .filter(|(_, dataset)| !dataset.is_empty())
            .map(|(source, _)| *source)
            .collect()
    }
}

/// How a run ended when configuration was valid.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// No source produced a single row; nothing was persisted.
    NoData(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Completed(report) | Self::NoData(report) => report,
        }
    }

    pub fn into_report(self) -> RunReport {
        match self {
            Self::Completed(report) | Self::NoData(report) => report,
        }
    }

    pub const fn has_data(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Runs one [`SourceCollector`] per requested source, then persists and merges.
///
/// Unknown or unregistered source names fail the run before any fetch. After that, nothing
/// short of a failed combined write turns into an error: collection crashes and per-source
/// write failures are recorded in the [`RunReport`].
pub struct CollectionOrchestrator {
    registry: Arc<FetcherRegistry>,
    collector: SourceCollector,
    sink: Arc<dyn DatasetSink>,
    source_workers: usize,
    default_starts: BTreeMap<SourceId, ObservationDate>,
}

impl CollectionOrchestrator {
    pub fn new(
        registry: Arc<FetcherRegistry>,
        limiter: Arc<RateLimiterSet>,
        settings: CollectorSettings,
        sink: Arc<dyn DatasetSink>,
    ) -> Self {
        Self {
            collector: SourceCollector::new(Arc::clone(&registry), limiter, settings),
            registry,
            sink,
            source_workers: 8,
            default_starts: CollectorConfig::default().default_start_dates,
        }
    }

    pub fn from_config(
        config: &CollectorConfig,
        registry: Arc<FetcherRegistry>,
        sink: Arc<dyn DatasetSink>,
    ) -> Self {
        Self {
            source_workers: config.source_workers,
            default_starts: config.default_start_dates.clone(),
            ..Self::new(
                registry,
                Arc::new(config.rate_limiter_set()),
                config.collector_settings(),
                sink,
            )
        }
    }

    pub fn with_source_workers(mut self, source_workers: usize) -> Self {
        self.source_workers = source_workers.max(1);
        self
    }

    pub fn with_default_start(mut self, source: SourceId, start: ObservationDate) -> Self {
        self.default_starts.insert(source, start);
        self
    }

    /// Turns a selection into registered source ids, in selection order without repeats.
    pub fn resolve_sources(&self, selection: &SourceSelection) -> Result<Vec<SourceId>, CoreError> {
        let names = match selection {
            SourceSelection::All => return Ok(self.registry.sources()),
            SourceSelection::Only(names) => names,
        };
        if names.is_empty() {
            return Err(ValidationError::InvalidSource {
                value: String::new(),
            }
            .into());
        }

        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let source: SourceId = name.parse()?;
            if !self.registry.contains(source) {
                return Err(CoreError::UnregisteredSource { source_id: source });
            }
            if !resolved.contains(&source) {
                resolved.push(source);
            }
        }
        Ok(resolved)
    }

    pub async fn run(
        &self,
        request: &CollectionRequest,
        catalog: &Catalog,
    ) -> Result<RunOutcome, CoreError> {
        let sources = self.resolve_sources(&request.sources)?;
        let end = request.end.unwrap_or_else(ObservationDate::today);
        let mut plan = Vec::with_capacity(sources.len());
        for source in &sources {
            let start = request
                .start
                .or_else(|| self.default_starts.get(source).copied())
                .unwrap_or(end);
            plan.push((*source, DateRange::new(start, end)?));
        }

        let stamp = RunStamp::now();
        let mut report = RunReport::new(stamp.clone(), sources.clone());
        if catalog.is_empty() {
            warn!(run_id = %stamp.run_id, "catalog is empty, no symbols to collect");
        }
        info!(
            run_id = %stamp.run_id,
            sources = ?sources,
            catalog_entries = catalog.len(),
            source_workers = self.source_workers,
            "collection run started"
        );

        let mut collections = self.collect_all(&plan, catalog).await;
        for (index, (source, _)) in plan.iter().enumerate() {
            let collection = match collections[index].take() {
                Some(Ok(collection)) => collection,
                Some(Err(error)) => {
                    error!(source = %source, error = %error, "source collection failed");
                    report.source_failures.push(SourceFailure {
                        source: *source,
                        stage: FailureStage::Collection,
                        message: error.to_string(),
                    });
                    SourceCollection::aborted(*source, catalog)
                }
                None => {
                    error!(source = %source, "source collection task did not complete");
                    report.source_failures.push(SourceFailure {
                        source: *source,
                        stage: FailureStage::Collection,
                        message: String::from("collection task panicked or was cancelled"),
                    });
                    SourceCollection::aborted(*source, catalog)
                }
            };
            report.summaries.push(collection.summary());
            report.failed_symbols.extend(collection.failed);
            report.datasets.insert(*source, collection.dataset);
        }

        for (source, dataset) in report.datasets.iter().filter(|(_, d)| !d.is_empty()) {
            match self.sink.persist_source(dataset, &stamp) {
                Ok(artifact) => {
                    info!(
                        source = %source,
                        location = %artifact.location,
                        rows = artifact.rows,
                        "source dataset persisted"
                    );
                    report.artifacts.push(artifact);
                }
                Err(error) => {
                    error!(source = %source, error = %error, "failed to persist source dataset");
                    report.source_failures.push(SourceFailure {
                        source: *source,
                        stage: FailureStage::Persistence,
                        message: error.to_string(),
                    });
                }
            }
        }

        let combined = normalizer::merge(&report.datasets);
        report.columns = combined.columns();
        report.combined_rows = combined.len();
        report.duplicates_dropped = combined.duplicates_dropped;

        if combined.is_empty() {
            warn!(
                run_id = %stamp.run_id,
                failed_symbols = report.failed_symbols.len(),
                "no data collected from any source"
            );
            return Ok(RunOutcome::NoData(report));
        }

        let artifacts =
            self.sink
                .persist_combined(&combined, &stamp)
                .map_err(|source| CoreError::Persistence {
                    target: String::from("combined dataset"),
                    source,
                })?;
        report.artifacts.extend(artifacts);

        if let Err(error) = self.sink.publish(&combined, catalog) {
            error!(error = %error, "failed to publish combined dataset");
            report.publish_error = Some(error.to_string());
        }

        info!(
            run_id = %stamp.run_id,
            rows = combined.len(),
            sources_with_data = report.sources_with_data().len(),
            failed_symbols = report.failed_symbols.len(),
            source_failures = report.source_failures.len(),
            "collection run finished"
        );
        report.combined = combined;
        Ok(RunOutcome::Completed(report))
    }

    async fn collect_all(
        &self,
        plan: &[(SourceId, DateRange)],
        catalog: &Catalog,
    ) -> Vec<Option<Result<SourceCollection, CoreError>>> {
        let catalog = Arc::new(catalog.clone());
        let permits = Arc::new(Semaphore::new(self.source_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (index, (source, range)) in plan.iter().copied().enumerate() {
            let collector = self.collector.clone();
            let catalog = Arc::clone(&catalog);
            let permits = Arc::clone(&permits);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    (index, collector.collect(source, &catalog, range).await)
                }
                .instrument(info_span!("source", source = %source)),
            );
        }

        let mut results: Vec<Option<Result<SourceCollection, CoreError>>> =
            plan.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(error) => warn!(error = %error, "source task aborted"),
            }
        }
        results
    }
}
