//! Per-source worker pool.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    Catalog, CoreError, DateRange, FetchOutcome, FetcherRegistry, ObservationDate,
    RateLimiterSet, RetryExecutor, RetryPolicy, SourceDataset, SourceId,
};

/// Knobs for one source's fetch pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectorSettings {
    /// Concurrent fetch tasks per source.
    pub max_workers: usize,
    pub retry: RetryPolicy,
    /// Emit an info-level progress line every this many completions.
    pub progress_every: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_workers: 10,
            retry: RetryPolicy::default(),
            progress_every: 10,
        }
    }
}

/// Why a catalog symbol contributed no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The fetcher answered with an empty series.
    NoData,
    FetchFailed {
        attempts: u32,
        code: &'static str,
        message: String,
    },
    /// The fetch task panicked or was cancelled.
    TaskAborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSymbol {
    pub symbol: String,
    pub source: SourceId,
    #[serde(flatten)]
    pub reason: FailureReason,
}

/// Everything one source produced in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCollection {
    pub dataset: SourceDataset,
    pub failed: Vec<FailedSymbol>,
    pub attempted: usize,
    pub succeeded: usize,
}

impl SourceCollection {
    pub fn empty(source: SourceId) -> Self {
        Self {
            dataset: SourceDataset::new(source),
            failed: Vec::new(),
            attempted: 0,
            succeeded: 0,
        }
    }

    /// Collection for a source whose task died: every catalog symbol is reported aborted.
    pub fn aborted(source: SourceId, catalog: &Catalog) -> Self {
        let failed: Vec<FailedSymbol> = catalog
            .entries_for(source)
            .into_iter()
            .map(|entry| FailedSymbol {
                symbol: entry.symbol.clone(),
                source,
                reason: FailureReason::TaskAborted,
            })
            .collect();
        Self {
            dataset: SourceDataset::new(source),
            attempted: failed.len(),
            succeeded: 0,
            failed,
        }
    }

    pub const fn source(&self) -> SourceId {
        self.dataset.source
    }

    /// Catalog had symbols for the source but none of them produced data.
    pub const fn is_total_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }

    pub fn summary(&self) -> SourceSummary {
        let span = self.dataset.date_span();
        SourceSummary {
            source: self.source(),
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed.len(),
            no_data: self
                .failed
                .iter()
                .filter(|failed| failed.reason == FailureReason::NoData)
                .count(),
            rows: self.dataset.len(),
            symbols: self.dataset.distinct_symbols(),
            first_date: span.map(|(first, _)| first),
            last_date: span.map(|(_, last)| last),
        }
    }

    fn record(&mut self, symbol: &str, outcome: FetchOutcome) {
        let source = self.source();
        match outcome {
            FetchOutcome::Series(series) if series.is_empty() => {
                debug!(source = %source, symbol, "no data in range");
                self.failed.push(FailedSymbol {
                    symbol: symbol.to_owned(),
                    source,
                    reason: FailureReason::NoData,
                });
            }
            FetchOutcome::Series(series) => {
                debug!(source = %source, symbol, rows = series.len(), "series collected");
                self.succeeded += 1;
                self.dataset.push_series(series);
            }
            FetchOutcome::Failed(terminal) => {
                self.failed.push(FailedSymbol {
                    symbol: symbol.to_owned(),
                    source,
                    reason: FailureReason::FetchFailed {
                        attempts: terminal.attempts,
                        code: terminal.error.code(),
                        message: terminal.error.message().to_owned(),
                    },
                });
            }
        }
    }
}

/// Serializable per-source statistics for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: SourceId,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub no_data: usize,
    pub rows: usize,
    pub symbols: usize,
    pub first_date: Option<ObservationDate>,
    pub last_date: Option<ObservationDate>,
}

/// Fetches every catalog symbol of one source through a bounded pool of tasks.
///
/// Results are folded in completion order. A symbol that fails, returns nothing, or whose
/// task dies is recorded in [`SourceCollection::failed`]; none of these fail the source.
#[derive(Debug, Clone)]
pub struct SourceCollector {
    registry: Arc<FetcherRegistry>,
    limiter: Arc<RateLimiterSet>,
    settings: CollectorSettings,
}

impl SourceCollector {
    pub fn new(
        registry: Arc<FetcherRegistry>,
        limiter: Arc<RateLimiterSet>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            registry,
            limiter,
            settings,
        }
    }

    pub const fn settings(&self) -> CollectorSettings {
        self.settings
    }

    /// Errors only when `source` has no registered fetcher.
    pub async fn collect(
        &self,
        source: SourceId,
        catalog: &Catalog,
        range: DateRange,
    ) -> Result<SourceCollection, CoreError> {
        let fetcher = self
            .registry
            .get(source)
            .ok_or(CoreError::UnregisteredSource { source_id: source })?;

        let symbols: Vec<String> = catalog
            .entries_for(source)
            .into_iter()
            .map(|entry| entry.symbol.clone())
            .collect();
        let mut collection = SourceCollection::empty(source);
        if symbols.is_empty() {
            warn!(source = %source, "no catalog entries for source");
            return Ok(collection);
        }

        let total = symbols.len();
        collection.attempted = total;
        info!(
            source = %source,
            symbols = total,
            max_workers = self.settings.max_workers,
            range = %range,
            "collecting source"
        );

        let executor = Arc::new(RetryExecutor::new(
            self.settings.retry,
            Arc::clone(&self.limiter),
        ));
        let permits = Arc::new(Semaphore::new(self.settings.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (index, symbol) in symbols.iter().enumerate() {
            let executor = Arc::clone(&executor);
            let fetcher = Arc::clone(&fetcher);
            let permits = Arc::clone(&permits);
            let symbol = symbol.clone();
            let span = info_span!("fetch", source = %source, symbol = %symbol);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = executor
                        .execute(fetcher.as_ref(), source, &symbol, range)
                        .await;
                    (index, outcome)
                }
                .instrument(span),
            );
        }

        let mut reported = vec![false; total];
        let mut completed = 0_usize;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((index, outcome)) => {
                    reported[index] = true;
                    collection.record(&symbols[index], outcome);
                }
                Err(error) => {
                    warn!(source = %source, error = %error, "fetch task aborted");
                }
            }

            let every = self.settings.progress_every.max(1);
            if completed % every == 0 || completed == total {
                info!(
                    source = %source,
                    completed,
                    total,
                    succeeded = collection.succeeded,
                    failed = collection.failed.len(),
                    "collection progress"
                );
            }
        }

        for (index, symbol) in symbols.iter().enumerate() {
            if !reported[index] {
                collection.failed.push(FailedSymbol {
                    symbol: symbol.clone(),
                    source,
                    reason: FailureReason::TaskAborted,
                });
            }
        }

        let summary = collection.summary();
        info!(
            source = %source,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            no_data = summary.no_data,
            rows = summary.rows,
            first_date = ?summary.first_date.map(|date| date.to_string()),
            last_date = ?summary.last_date.map(|date| date.to_string()),
            "source collection finished"
        );
        if collection.is_total_failure() {
            warn!(source = %source, attempted = total, "every symbol failed for source");
        }

        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::fetcher::SeriesFuture;
    use crate::{
        FetchError, Fetcher, FetcherRegistryBuilder, RateLimit, RawSeries, SeriesPoint,
        SymbolEntry,
    };

    /// Returns one point for `OK*` symbols, nothing for `NONE*`, and fails for the rest.
    /// Tracks how many fetches run at once.
    #[derive(Default)]
    struct ScriptedFinraFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Fetcher for ScriptedFinraFetcher {
        fn fetch_single_series<'a>(
            &'a self,
            symbol: &'a str,
            range: DateRange,
        ) -> SeriesFuture<'a> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if symbol.starts_with("OK") {
                    Ok(RawSeries::new(
                        symbol,
                        SourceId::Finra,
                        vec![SeriesPoint::new(range.end, 1.0)],
                    ))
                } else if symbol.starts_with("NONE") {
                    Ok(RawSeries::empty(symbol, SourceId::Finra))
                } else {
                    Err(FetchError::invalid_request("rejected"))
                }
            })
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            ObservationDate::parse("2024-01-01").expect("start"),
            ObservationDate::parse("2024-01-31").expect("end"),
        )
        .expect("range")
    }

    fn collector(fetcher: Arc<ScriptedFinraFetcher>, max_workers: usize) -> SourceCollector {
        let registry = FetcherRegistryBuilder::custom()
            .with_fetcher(SourceId::Finra, fetcher)
            .build();
        SourceCollector::new(
            Arc::new(registry),
            Arc::new(RateLimiterSet::uniform(RateLimit::new(
                10_000,
                Duration::from_secs(1),
            ))),
            CollectorSettings {
                max_workers,
                retry: RetryPolicy::no_retry(),
                progress_every: 5,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn every_symbol_lands_in_exactly_one_bucket() {
        let catalog = Catalog::from_entries(vec![
            SymbolEntry::new("OK_A", "finra"),
            SymbolEntry::new("NONE_B", "FINRA"),
            SymbolEntry::new("BAD_C", "finra"),
            SymbolEntry::new("OK_D", "finra"),
            SymbolEntry::new("GDP", "fred"),
        ]);

        let collection = collector(Arc::new(ScriptedFinraFetcher::default()), 3)
            .collect(SourceId::Finra, &catalog, range())
            .await
            .expect("collection");

        assert_eq!(collection.attempted, 4);
        assert_eq!(collection.succeeded, 2);
        assert_eq!(collection.dataset.len(), 2);
        let failed: HashSet<&str> = collection
            .failed
            .iter()
            .map(|failed| failed.symbol.as_str())
            .collect();
        assert_eq!(failed, HashSet::from(["NONE_B", "BAD_C"]));
        assert!(collection
            .failed
            .iter()
            .any(|failed| failed.reason == FailureReason::NoData));
        assert!(collection
            .dataset
            .rows
            .iter()
            .all(|row| row.source == SourceId::Finra));
    }

    #[test]
    fn aborted_source_reports_each_catalog_symbol() {
        let catalog = Catalog::from_entries(vec![
            SymbolEntry::new("OK_A", "finra"),
            SymbolEntry::new("GDP", "fred"),
            SymbolEntry::new("BAD_C", "FINRA"),
        ]);

        let collection = SourceCollection::aborted(SourceId::Finra, &catalog);

        assert!(collection.dataset.is_empty());
        assert!(collection.is_total_failure());
        let failed: Vec<(&str, SourceId)> = collection
            .failed
            .iter()
            .map(|failed| (failed.symbol.as_str(), failed.source))
            .collect();
        assert_eq!(failed, vec![("OK_A", SourceId::Finra), ("BAD_C", SourceId::Finra)]);
        assert!(collection
            .failed
            .iter()
            .all(|failed| failed.reason == FailureReason::TaskAborted));
        assert_eq!(collection.summary().failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_never_exceeds_max_workers() {
        let fetcher = Arc::new(ScriptedFinraFetcher::default());
        let catalog = Catalog::from_entries(
            (0..25).map(|index| SymbolEntry::new(format!("OK_{index}"), "finra")),
        );

        let collection = collector(Arc::clone(&fetcher), 4)
            .collect(SourceId::Finra, &catalog, range())
            .await
            .expect("collection");

        assert_eq!(collection.succeeded, 25);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn source_without_entries_is_empty_not_an_error() {
        let catalog = Catalog::from_entries(vec![SymbolEntry::new("GDP", "fred")]);

        let collection = collector(Arc::new(ScriptedFinraFetcher::default()), 2)
            .collect(SourceId::Finra, &catalog, range())
            .await
            .expect("collection");

        assert!(collection.dataset.is_empty());
        assert!(collection.failed.is_empty());
        assert!(!collection.is_total_failure());
    }

    #[tokio::test]
    async fn unregistered_source_is_an_error() {
        let error = collector(Arc::new(ScriptedFinraFetcher::default()), 2)
            .collect(SourceId::Usda, &Catalog::empty(), range())
            .await
            .expect_err("usda is not registered");

        assert!(matches!(
            error,
            CoreError::UnregisteredSource {
                source_id: SourceId::Usda
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_flag_the_source() {
        let catalog = Catalog::from_entries(vec![
            SymbolEntry::new("BAD_A", "finra"),
            SymbolEntry::new("NONE_B", "finra"),
        ]);

        let collection = collector(Arc::new(ScriptedFinraFetcher::default()), 2)
            .collect(SourceId::Finra, &catalog, range())
            .await
            .expect("collection");

        assert!(collection.is_total_failure());
        assert_eq!(collection.summary().no_data, 1);
    }
}
