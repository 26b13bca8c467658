mod catalog;
mod dataset;
mod date;
mod series;

pub use catalog::{Catalog, CatalogSummary, SymbolEntry};
pub use dataset::{CombinedDataset, CombinedRow, Observation, SourceDataset, CANONICAL_COLUMNS};
pub use date::{DateRange, ObservationDate};
pub use series::{FieldValue, RawSeries, SeriesPoint};
