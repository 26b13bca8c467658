//! Behavior tests for a full collection run: fan-out over sources, isolation of failures,
//! persistence hand-off and the distinct "no data" outcome.

use std::sync::Arc;
use std::time::Duration;

use macrofetch_core::{
    ArtifactKind, CoreError, FailureReason, FailureStage, FieldValue, RunOutcome,
    ValidationError,
};
use macrofetch_tests::*;

fn orchestrator(
    fetchers: Vec<(SourceId, Arc<ScriptedFetcher>)>,
    sink: Arc<MemorySink>,
) -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        registry(fetchers),
        unlimited(),
        settings(0, Duration::from_millis(1)),
        sink,
    )
}

fn aapl_points() -> Vec<SeriesPoint> {
    vec![
        SeriesPoint::new(date("2024-01-02"), 185.64).with_extra("volume", 82_488_700_i64),
        SeriesPoint::new(date("2024-01-03"), 184.25).with_extra("volume", 58_414_500_i64),
    ]
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn when_two_sources_return_data_system_persists_each_and_the_combined_view() {
    // Given: yahoo serves AAPL with a volume column and fred serves GDP without extras
    let yahoo = Arc::new(ScriptedFetcher::new().script("AAPL", Script::Points(aapl_points())));
    let fred = Arc::new(ScriptedFetcher::new().script(
        "GDP",
        Script::Points(vec![SeriesPoint::new(date("2024-01-01"), 28_269.2)]),
    ));
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(
        vec![(SourceId::Yahoo, yahoo), (SourceId::Fred, fred)],
        Arc::clone(&sink),
    );

    // When: both sources are collected for January
    let outcome = orchestrator
        .run(
            &request("yahoo,fred", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo"), ("GDP", "fred")]),
        )
        .await
        .expect("run succeeds");

    // Then: the combined view has the canonical columns plus volume, with gaps for GDP
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected data");
    };
    assert_eq!(
        report.columns,
        vec!["date", "symbol", "value", "source", "volume"]
    );
    assert_eq!(report.combined_rows, 3);
    let gdp = report
        .combined
        .rows
        .iter()
        .find(|row| row.symbol == "GDP")
        .expect("gdp row");
    assert_eq!(gdp.source, SourceId::Fred);
    assert_eq!(gdp.extras, vec![None]);
    let aapl = report
        .combined
        .rows
        .iter()
        .find(|row| row.symbol == "AAPL" && row.date == date("2024-01-02"))
        .expect("aapl row");
    assert_eq!(aapl.extras, vec![Some(FieldValue::Int(82_488_700))]);

    // And: each source was persisted before the combined dataset, which was then published
    assert_eq!(sink.source_datasets().len(), 2);
    assert_eq!(sink.combined_datasets().len(), 1);
    assert_eq!(sink.publish_count(), 1);
    assert!(report
        .artifacts
        .iter()
        .any(|artifact| artifact.kind == ArtifactKind::Latest));
}

#[tokio::test]
async fn when_catalog_has_unknown_source_names_system_ignores_those_entries() {
    // Given: a catalog mixing a known and an unknown source
    let yahoo = Arc::new(ScriptedFetcher::new());
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(vec![(SourceId::Yahoo, yahoo.clone())], sink);

    // When: every registered source is collected
    let outcome = orchestrator
        .run(
            &request("all", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "Yahoo"), ("XAU", "bloomberg")]),
        )
        .await
        .expect("run succeeds");

    // Then: only the known source's symbol was fetched
    assert!(outcome.has_data());
    assert_eq!(yahoo.calls().len(), 1);
    assert_eq!(outcome.report().sources, vec![SourceId::Yahoo]);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn when_one_source_fails_entirely_system_still_delivers_the_others() {
    // Given: yahoo works, fred rejects every request, eia crashes on one symbol
    let yahoo = Arc::new(ScriptedFetcher::new());
    let fred = Arc::new(
        ScriptedFetcher::new()
            .script("GDP", Script::Fail(FetchError::unauthorized("bad key")))
            .script("UNRATE", Script::Fail(FetchError::unauthorized("bad key"))),
    );
    let eia = Arc::new(ScriptedFetcher::new().script("PET.CRASH", Script::Panic));
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(
        vec![
            (SourceId::Yahoo, yahoo),
            (SourceId::Fred, fred),
            (SourceId::Eia, eia),
        ],
        Arc::clone(&sink),
    );

    // When: all three sources are collected
    let outcome = orchestrator
        .run(
            &request("yahoo,fred,eia", "2024-01-01", "2024-01-31"),
            &catalog(&[
                ("AAPL", "yahoo"),
                ("GDP", "fred"),
                ("UNRATE", "fred"),
                ("PET.CRASH", "eia"),
                ("PET.OK", "eia"),
            ]),
        )
        .await
        .expect("run succeeds");

    // Then: data from yahoo and the surviving eia symbol is combined
    let report = outcome.into_report();
    assert_eq!(report.sources_with_data(), vec![SourceId::Yahoo, SourceId::Eia]);
    assert_eq!(report.combined_rows, 2);

    // And: every failure is reported per symbol
    let failed: Vec<(&str, SourceId)> = report
        .failed_symbols
        .iter()
        .map(|failed| (failed.symbol.as_str(), failed.source))
        .collect();
    assert_eq!(failed.len(), 3);
    assert!(failed.contains(&("GDP", SourceId::Fred)));
    assert!(failed.contains(&("UNRATE", SourceId::Fred)));
    assert!(failed.contains(&("PET.CRASH", SourceId::Eia)));
    let crash = report
        .failed_symbols
        .iter()
        .find(|failed| failed.symbol == "PET.CRASH")
        .expect("crash entry");
    assert_eq!(crash.reason, FailureReason::TaskAborted);

    // And: the fully failed source has no per-source artifact
    assert!(sink
        .source_datasets()
        .iter()
        .all(|dataset| dataset.source != SourceId::Fred));
}

#[tokio::test]
async fn when_a_source_artifact_cannot_be_written_system_records_it_and_continues() {
    // Given: a sink that refuses yahoo's per-source file
    let sink = Arc::new(MemorySink::new().failing_source(SourceId::Yahoo));
    let orchestrator = orchestrator(
        vec![
            (SourceId::Yahoo, Arc::new(ScriptedFetcher::new())),
            (SourceId::Fred, Arc::new(ScriptedFetcher::new())),
        ],
        Arc::clone(&sink),
    );

    // When: the run completes
    let outcome = orchestrator
        .run(
            &request("yahoo,fred", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo"), ("GDP", "fred")]),
        )
        .await
        .expect("run succeeds");

    // Then: the failure is reported and the combined dataset still carries both sources
    let report = outcome.report();
    assert_eq!(report.source_failures.len(), 1);
    assert_eq!(report.source_failures[0].source, SourceId::Yahoo);
    assert_eq!(report.source_failures[0].stage, FailureStage::Persistence);
    assert_eq!(report.combined.sources(), vec![SourceId::Yahoo, SourceId::Fred]);
}

#[tokio::test]
async fn when_the_combined_artifact_cannot_be_written_system_fails_the_run() {
    // Given: a sink whose combined write fails
    let sink = Arc::new(MemorySink::new().failing_combined());
    let orchestrator = orchestrator(
        vec![(SourceId::Yahoo, Arc::new(ScriptedFetcher::new()))],
        Arc::clone(&sink),
    );

    // When: data is collected
    let result = orchestrator
        .run(
            &request("yahoo", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo")]),
        )
        .await;

    // Then: the run reports a persistence error and nothing is published
    assert!(matches!(result, Err(CoreError::Persistence { .. })));
    assert_eq!(sink.publish_count(), 0);
}

// =============================================================================
// No-data outcome
// =============================================================================

#[tokio::test]
async fn when_no_symbol_returns_data_system_reports_no_data_instead_of_success() {
    // Given: every symbol has nothing in range
    let yahoo = Arc::new(
        ScriptedFetcher::new()
            .script("AAPL", Script::Empty)
            .script("MSFT", Script::Empty),
    );
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(vec![(SourceId::Yahoo, yahoo)], Arc::clone(&sink));

    // When: the source is collected
    let outcome = orchestrator
        .run(
            &request("yahoo", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo"), ("MSFT", "yahoo")]),
        )
        .await
        .expect("run completes");

    // Then: the outcome is NoData, the empty symbols are listed, and nothing is written
    let RunOutcome::NoData(report) = outcome else {
        panic!("expected no data");
    };
    assert_eq!(report.failed_symbols.len(), 2);
    assert!(report
        .failed_symbols
        .iter()
        .all(|failed| failed.reason == FailureReason::NoData));
    assert!(sink.source_datasets().is_empty());
    assert!(sink.combined_datasets().is_empty());
}

#[tokio::test]
async fn when_a_source_has_no_catalog_entries_system_skips_it_quietly() {
    // Given: fred is requested but the catalog only lists yahoo symbols
    let fred = Arc::new(ScriptedFetcher::new());
    let orchestrator = orchestrator(
        vec![
            (SourceId::Yahoo, Arc::new(ScriptedFetcher::new())),
            (SourceId::Fred, fred.clone()),
        ],
        Arc::new(MemorySink::new()),
    );

    // When: both are collected
    let outcome = orchestrator
        .run(
            &request("yahoo,fred", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo")]),
        )
        .await
        .expect("run succeeds");

    // Then: fred was never called and reports zero attempts
    assert_eq!(fred.calls().len(), 0);
    let fred_summary = outcome
        .report()
        .summaries
        .iter()
        .find(|summary| summary.source == SourceId::Fred)
        .expect("fred summary");
    assert_eq!(fred_summary.attempted, 0);
    assert!(outcome.report().source_failures.is_empty());
}

// =============================================================================
// Fail-fast validation
// =============================================================================

#[tokio::test]
async fn when_an_unknown_source_is_requested_system_fails_before_fetching() {
    // Given: a working yahoo fetcher
    let yahoo = Arc::new(ScriptedFetcher::new());
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(vec![(SourceId::Yahoo, yahoo.clone())], Arc::clone(&sink));

    // When: the request names a source nobody knows
    let error = orchestrator
        .run(
            &request("yahoo,bloomberg", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo")]),
        )
        .await
        .expect_err("unknown source");

    // Then: the error names it and no fetch or write happened
    assert!(matches!(
        error,
        CoreError::Validation(ValidationError::InvalidSource { ref value }) if value == "bloomberg"
    ));
    assert!(error.is_configuration());
    assert!(yahoo.calls().is_empty());
    assert!(sink.source_datasets().is_empty());
}

#[tokio::test]
async fn when_a_known_source_has_no_fetcher_system_fails_before_fetching() {
    let yahoo = Arc::new(ScriptedFetcher::new());
    let orchestrator = orchestrator(
        vec![(SourceId::Yahoo, yahoo.clone())],
        Arc::new(MemorySink::new()),
    );

    let error = orchestrator
        .run(
            &request("yahoo,occ", "2024-01-01", "2024-01-31"),
            &catalog(&[("AAPL", "yahoo")]),
        )
        .await
        .expect_err("unregistered source");

    assert!(matches!(
        error,
        CoreError::UnregisteredSource {
            source_id: SourceId::Occ
        }
    ));
    assert!(yahoo.calls().is_empty());
}

#[tokio::test]
async fn when_start_is_after_end_system_rejects_the_request() {
    let yahoo = Arc::new(ScriptedFetcher::new());
    let orchestrator = orchestrator(
        vec![(SourceId::Yahoo, yahoo.clone())],
        Arc::new(MemorySink::new()),
    );

    let error = orchestrator
        .run(
            &request("yahoo", "2024-02-01", "2024-01-01"),
            &catalog(&[("AAPL", "yahoo")]),
        )
        .await
        .expect_err("inverted range");

    assert!(matches!(
        error,
        CoreError::Validation(ValidationError::InvertedDateRange { .. })
    ));
    assert!(yahoo.calls().is_empty());
}

// =============================================================================
// Offline mode
// =============================================================================

#[tokio::test]
async fn when_running_in_mock_mode_system_collects_every_source_offline() {
    // Given: the synthetic registry and one symbol per source
    let registry = Arc::new(FetcherRegistryBuilder::new().with_mock_mode().build());
    let sink = Arc::new(MemorySink::new());
    let orchestrator =
        CollectionOrchestrator::new(registry, unlimited(), CollectorSettings::default(), sink);
    let entries: Vec<(String, String)> = SourceId::ALL
        .iter()
        .map(|source| (format!("{}_SERIES", source.env_prefix()), source.to_string()))
        .collect();
    let catalog = Catalog::from_entries(
        entries
            .iter()
            .map(|(symbol, source)| SymbolEntry::new(symbol.as_str(), source.as_str())),
    );

    // When: all sources are collected over a quarter
    let outcome = orchestrator
        .run(&request("all", "2024-01-01", "2024-03-31"), &catalog)
        .await
        .expect("run succeeds");

    // Then: every source contributed rows
    assert_eq!(outcome.report().sources_with_data(), SourceId::ALL.to_vec());
    assert!(outcome.report().failed_symbols.is_empty());
}
