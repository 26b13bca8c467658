//! Behavior tests for the canonical merge: column layout, explicit gaps, uniqueness and
//! independence from arrival order.

use std::collections::{BTreeMap, HashMap};

use macrofetch_core::{normalizer, CombinedDataset, FieldValue, SourceDataset};
use macrofetch_tests::*;

fn dataset(source: SourceId, series: Vec<(&str, Vec<SeriesPoint>)>) -> SourceDataset {
    let mut dataset = SourceDataset::new(source);
    for (symbol, points) in series {
        dataset.push_series(RawSeries::new(symbol, source, points));
    }
    dataset
}

fn yahoo() -> SourceDataset {
    dataset(
        SourceId::Yahoo,
        vec![
            (
                "MSFT",
                vec![SeriesPoint::new(date("2024-01-02"), 370.87).with_extra("volume", 25_258_600_i64)],
            ),
            (
                "AAPL",
                vec![
                    SeriesPoint::new(date("2024-01-03"), 184.25)
                        .with_extra("volume", 58_414_500_i64),
                    SeriesPoint::new(date("2024-01-02"), 185.64)
                        .with_extra("volume", 82_488_700_i64),
                ],
            ),
        ],
    )
}

fn eia() -> SourceDataset {
    dataset(
        SourceId::Eia,
        vec![(
            "PET.RWTC.D",
            vec![SeriesPoint::new(date("2024-01-02"), 70.38).with_extra("unit", "$/bbl")],
        )],
    )
}

fn fred() -> SourceDataset {
    dataset(
        SourceId::Fred,
        vec![("GDP", vec![SeriesPoint::new(date("2024-01-01"), 28_269.2)])],
    )
}

fn keys(combined: &CombinedDataset) -> Vec<(String, String, SourceId)> {
    combined
        .rows
        .iter()
        .map(|row| (row.date.to_string(), row.symbol.clone(), row.source))
        .collect()
}

#[test]
fn when_sources_carry_different_extras_system_unions_them_with_explicit_gaps() {
    // Given: yahoo with volume, eia with a text unit, fred with no extras
    let mut datasets = BTreeMap::new();
    datasets.insert(SourceId::Eia, eia());
    datasets.insert(SourceId::Fred, fred());
    datasets.insert(SourceId::Yahoo, yahoo());

    // When: they are merged
    let combined = normalizer::merge(&datasets);

    // Then: extras follow the canonical columns in first-seen order
    assert_eq!(
        combined.columns(),
        vec!["date", "symbol", "value", "source", "volume", "unit"]
    );

    // And: every row has one slot per extra column, with None where a source has no value
    assert!(combined.rows.iter().all(|row| row.extras.len() == 2));
    let gdp = combined
        .rows
        .iter()
        .find(|row| row.symbol == "GDP")
        .expect("gdp");
    assert_eq!(gdp.extras, vec![None, None]);
    let wti = combined
        .rows
        .iter()
        .find(|row| row.symbol == "PET.RWTC.D")
        .expect("wti");
    assert_eq!(
        wti.extras,
        vec![None, Some(FieldValue::Text(String::from("$/bbl")))]
    );
}

#[test]
fn when_inputs_arrive_in_a_different_order_system_produces_identical_output() {
    // Given: the same datasets in a BTreeMap and in a HashMap built in reverse order
    let mut ordered = BTreeMap::new();
    ordered.insert(SourceId::Yahoo, yahoo());
    ordered.insert(SourceId::Fred, fred());
    ordered.insert(SourceId::Eia, eia());
    let mut shuffled = HashMap::new();
    shuffled.insert(SourceId::Eia, eia());
    shuffled.insert(SourceId::Fred, fred());
    shuffled.insert(SourceId::Yahoo, yahoo());

    // When: both are merged
    let first = normalizer::merge(&ordered);
    let second = normalizer::merge(&shuffled);

    // Then: rows and columns match exactly
    assert_eq!(first, second);
    assert_eq!(
        keys(&first)[..3],
        [
            (String::from("2024-01-02"), String::from("AAPL"), SourceId::Yahoo),
            (String::from("2024-01-03"), String::from("AAPL"), SourceId::Yahoo),
            (String::from("2024-01-02"), String::from("MSFT"), SourceId::Yahoo),
        ]
    );
}

#[test]
fn when_a_row_is_repeated_system_keeps_exactly_one() {
    // Given: a fetcher that returned the same day twice
    let repeated = dataset(
        SourceId::Fred,
        vec![(
            "UNRATE",
            vec![
                SeriesPoint::new(date("2024-01-01"), 3.7),
                SeriesPoint::new(date("2024-01-01"), 3.8),
                SeriesPoint::new(date("2024-02-01"), 3.9),
            ],
        )],
    );

    // When: it is normalized
    let combined = normalizer::normalize_source(&repeated);

    // Then: (date, symbol, source) is unique and the drop is counted
    let mut unique = keys(&combined);
    unique.dedup();
    assert_eq!(unique.len(), combined.len());
    assert_eq!(combined.len(), 2);
    assert_eq!(combined.duplicates_dropped, 1);
}

#[test]
fn when_the_same_symbol_comes_from_two_sources_system_keeps_both_rows() {
    let from_yahoo = dataset(
        SourceId::Yahoo,
        vec![("SPY", vec![SeriesPoint::new(date("2024-01-02"), 472.65)])],
    );
    let from_sp500 = dataset(
        SourceId::Sp500,
        vec![("SPY", vec![SeriesPoint::new(date("2024-01-02"), 4_742.83)])],
    );
    let mut datasets = BTreeMap::new();
    datasets.insert(SourceId::Sp500, from_sp500);
    datasets.insert(SourceId::Yahoo, from_yahoo);

    let combined = normalizer::merge(&datasets);

    assert_eq!(combined.len(), 2);
    assert_eq!(combined.sources(), vec![SourceId::Yahoo, SourceId::Sp500]);
    assert_eq!(combined.duplicates_dropped, 0);
}
