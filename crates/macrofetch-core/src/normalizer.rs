//! Canonical long-format merge of per-source datasets.
//!
//! Output columns are `date, symbol, value, source` followed by every extra column seen in
//! any input, in first-seen order. Inputs are visited in [`SourceId`] order and each
//! dataset's rows in `(symbol, date)` order, so the result does not depend on map iteration
//! order or on the order in which fetches completed. Rows are unique on
//! `(date, symbol, source)`; the first occurrence wins.
//!
//! Column names compare ASCII case-insensitively, as the warehouse does: extras spelled like
//! a canonical column are dropped, and case variants of one extra share the first-seen
//! spelling.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::domain::CANONICAL_COLUMNS;
use crate::{CombinedDataset, CombinedRow, Observation, ObservationDate, SourceDataset, SourceId};

/// Merges every dataset into one [`CombinedDataset`].
///
/// Accepts any `(source, dataset)` mapping. An input made only of empty datasets yields an
/// empty result with no extra columns.
pub fn merge<'a, I>(datasets: I) -> CombinedDataset
where
    I: IntoIterator<Item = (&'a SourceId, &'a SourceDataset)>,
{
    let mut ordered: Vec<(SourceId, &SourceDataset)> = datasets
        .into_iter()
        .map(|(source, dataset)| (*source, dataset))
        .collect();
    ordered.sort_by_key(|(source, _)| *source);

    let mut extra_columns: Vec<String> = Vec::new();
    let mut seen: HashSet<(ObservationDate, &str, SourceId)> = HashSet::new();
    let mut accepted: Vec<&Observation> = Vec::new();
    let mut duplicates_dropped = 0_usize;

    for (_, dataset) in &ordered {
        let mut rows: Vec<&Observation> = dataset.rows.iter().collect();
        rows.sort_by(|left, right| {
            left.symbol
                .cmp(&right.symbol)
                .then_with(|| left.date.cmp(&right.date))
        });

        for row in rows {
            if !seen.insert((row.date, row.symbol.as_str(), row.source)) {
                duplicates_dropped += 1;
                continue;
            }
            for (name, _) in &row.extras {
                if !is_canonical(name) && !contains_column(&extra_columns, name) {
                    extra_columns.push(name.clone());
                }
            }
            accepted.push(row);
        }
    }

    let rows: Vec<CombinedRow> = accepted
        .into_iter()
        .map(|row| CombinedRow {
            date: row.date,
            symbol: row.symbol.clone(),
            value: row.value,
            source: row.source,
            extras: extra_columns
                .iter()
                .map(|column| {
                    row.extras
                        .iter()
                        .find(|(name, _)| name.eq_ignore_ascii_case(column))
                        .map(|(_, value)| value.clone())
                })
                .collect(),
        })
        .collect();

    if duplicates_dropped > 0 {
        warn!(
            duplicates_dropped,
            "duplicate (date, symbol, source) rows dropped during merge"
        );
    }
    debug!(
        sources = ordered.len(),
        rows = rows.len(),
        extra_columns = ?extra_columns,
        "datasets merged"
    );

    CombinedDataset {
        extra_columns,
        rows,
        duplicates_dropped,
    }
}

fn is_canonical(name: &str) -> bool {
    CANONICAL_COLUMNS
        .iter()
        .any(|column| column.eq_ignore_ascii_case(name))
}

fn contains_column(columns: &[String], name: &str) -> bool {
    columns.iter().any(|column| column.eq_ignore_ascii_case(name))
}

/// Canonical shape of a single source dataset.
pub fn normalize_source(dataset: &SourceDataset) -> CombinedDataset {
    merge([(&dataset.source, dataset)])
}
