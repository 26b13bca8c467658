//! Persistence seam between orchestration and storage.

use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Catalog, CombinedDataset, SourceDataset, SourceId};

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Identity of one orchestrator run; the label is embedded in artifact names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStamp {
    pub run_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// `YYYYMMDD_HHMMSS` in UTC.
    pub label: String,
}

impl RunStamp {
    pub fn now() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    pub fn at(started_at: OffsetDateTime) -> Self {
        let format = format_description!("[year][month][day]_[hour][minute][second]");
        let utc = started_at.to_offset(time::UtcOffset::UTC);
        let label = utc
            .format(&format)
            .unwrap_or_else(|_| utc.unix_timestamp().to_string());
        Self {
            run_id: Uuid::new_v4(),
            started_at: utc,
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum ArtifactKind {
    Source(SourceId),
    Combined,
    /// Stable alias that always points at the newest combined dataset.
    Latest,
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(source) => write!(f, "source:{source}"),
            Self::Combined => f.write_str("combined"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

/// Something a sink wrote, e.g. a parquet file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedArtifact {
    pub kind: ArtifactKind,
    pub location: String,
    pub rows: usize,
}

/// Storage for collected data.
///
/// The orchestrator calls `persist_source` once per non-empty source dataset, then
/// `persist_combined` once with the merged result. `persist_combined` returns the combined
/// artifact followed by the latest alias. `publish` runs last and is optional.
pub trait DatasetSink: Send + Sync {
    fn persist_source(
        &self,
        dataset: &SourceDataset,
        stamp: &RunStamp,
    ) -> Result<PersistedArtifact, SinkError>;

    fn persist_combined(
        &self,
        combined: &CombinedDataset,
        stamp: &RunStamp,
    ) -> Result<Vec<PersistedArtifact>, SinkError>;

    /// Pushes the combined rows to a queryable store.
    fn publish(&self, _combined: &CombinedDataset, _catalog: &Catalog) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sources: Vec<SourceDataset>,
    combined: Vec<CombinedDataset>,
    published: usize,
}

/// Keeps everything in memory; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
    fail_sources: Vec<SourceId>,
    fail_combined: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `persist_source` fail for `source`.
    pub fn failing_source(mut self, source: SourceId) -> Self {
        self.fail_sources.push(source);
        self
    }

    /// Makes `persist_combined` fail.
    pub fn failing_combined(mut self) -> Self {
        self.fail_combined = true;
        self
    }

    pub fn source_datasets(&self) -> Vec<SourceDataset> {
        self.with_state(|state| state.sources.clone())
    }

    pub fn combined_datasets(&self) -> Vec<CombinedDataset> {
        self.with_state(|state| state.combined.clone())
    }

    pub fn publish_count(&self) -> usize {
        self.with_state(|state| state.published)
    }

    fn with_state<T>(&self, read: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        read(&mut guard)
    }
}

impl DatasetSink for MemorySink {
    fn persist_source(
        &self,
        dataset: &SourceDataset,
        stamp: &RunStamp,
    ) -> Result<PersistedArtifact, SinkError> {
        if self.fail_sources.contains(&dataset.source) {
            return Err(format!("memory sink refused {}", dataset.source).into());
        }
        self.with_state(|state| state.sources.push(dataset.clone()));
        Ok(PersistedArtifact {
            kind: ArtifactKind::Source(dataset.source),
            location: format!("memory://{}_{}", dataset.source, stamp.label),
            rows: dataset.len(),
        })
    }

    fn persist_combined(
        &self,
        combined: &CombinedDataset,
        stamp: &RunStamp,
    ) -> Result<Vec<PersistedArtifact>, SinkError> {
        if self.fail_combined {
            return Err("memory sink refused combined dataset".into());
        }
        self.with_state(|state| state.combined.push(combined.clone()));
        Ok(vec![
            PersistedArtifact {
                kind: ArtifactKind::Combined,
                location: format!("memory://all_sources_combined_{}", stamp.label),
                rows: combined.len(),
            },
            PersistedArtifact {
                kind: ArtifactKind::Latest,
                location: String::from("memory://all_sources_combined_latest"),
                rows: combined.len(),
            },
        ])
    }

    fn publish(&self, _combined: &CombinedDataset, _catalog: &Catalog) -> Result<(), SinkError> {
        self.with_state(|state| state.published += 1);
        Ok(())
    }
}
