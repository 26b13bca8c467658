use serde::Serialize;

use crate::{FieldValue, ObservationDate, RawSeries, SourceId};

/// Leading columns of every persisted dataset, in order.
pub const CANONICAL_COLUMNS: [&str; 4] = ["date", "symbol", "value", "source"];

/// One long-format row of a source dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub date: ObservationDate,
    pub symbol: String,
    pub value: f64,
    pub source: SourceId,
    pub extras: Vec<(String, FieldValue)>,
}

/// All successfully fetched rows of one source, tagged with that source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDataset {
    pub source: SourceId,
    pub rows: Vec<Observation>,
}

impl SourceDataset {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            rows: Vec::new(),
        }
    }

    /// Appends a fetched series. Rows are tagged with this dataset's source regardless of
    /// what the fetcher reported.
    pub fn push_series(&mut self, series: RawSeries) {
        let RawSeries { symbol, points, .. } = series;
        self.rows.reserve(points.len());
        for point in points {
            self.rows.push(Observation {
                date: point.date,
                symbol: symbol.clone(),
                value: point.value,
                source: self.source,
                extras: point.extras,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Earliest and latest observation dates.
    pub fn date_span(&self) -> Option<(ObservationDate, ObservationDate)> {
        let first = self.rows.first()?.date;
        Some(self.rows.iter().fold((first, first), |(min, max), row| {
            (min.min(row.date), max.max(row.date))
        }))
    }

    pub fn distinct_symbols(&self) -> usize {
        let mut symbols: Vec<&str> = self.rows.iter().map(|row| row.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols.len()
    }
}

/// One row of the combined dataset; `extras` is aligned with
/// [`CombinedDataset::extra_columns`] and `None` marks "no value".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRow {
    pub date: ObservationDate,
    pub symbol: String,
    pub value: f64,
    pub source: SourceId,
    pub extras: Vec<Option<FieldValue>>,
}

/// Canonical long-format union of every source dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedDataset {
    pub extra_columns: Vec<String>,
    pub rows: Vec<CombinedRow>,
    /// Rows removed because their `(date, symbol, source)` key was already present.
    pub duplicates_dropped: usize,
}

impl CombinedDataset {
    /// Full column list: the canonical columns followed by extras in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        CANONICAL_COLUMNS
            .iter()
            .map(|column| (*column).to_owned())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.rows.iter().map(|row| row.source).collect();
        sources.sort_unstable();
        sources.dedup();
        sources
    }
}
