//! DuckDB-backed storage for macrofetch.
//!
//! Implements [`DatasetSink`]: per-source and combined datasets become parquet files under
//! the raw directory, every written file is recorded in `collection_artifacts`, and
//! `publish` upserts the combined rows and the catalog into `observations` and `symbols`.

pub mod catalog;
mod export;
pub mod migrations;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;
use macrofetch_core::{
    normalizer, ArtifactKind, Catalog, CollectorConfig, CombinedDataset, DatasetSink,
    PersistedArtifact, RunStamp, SinkError, SourceDataset,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

pub use catalog::load_catalog;

pub const COMBINED_PREFIX: &str = "all_sources_combined";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("catalog file not found: {}", path.display())]
    CatalogMissing { path: PathBuf },

    #[error("invalid catalog {}: {reason}", path.display())]
    InvalidCatalog { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub db_path: PathBuf,
}

impl WarehouseConfig {
    /// Lays everything out under `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            raw_dir: data_dir.join("raw"),
            db_path: data_dir.join("macrofetch.duckdb"),
            data_dir,
        }
    }

    pub fn from_collector_config(config: &CollectorConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            raw_dir: config.raw_dir.clone(),
            db_path: config.db_path.clone(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

/// One row of `collection_artifacts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub run_id: String,
    pub run_label: String,
    pub kind: String,
    pub source: Option<String>,
    pub path: String,
    pub row_count: i64,
}

pub struct Warehouse {
    config: WarehouseConfig,
    connection: Mutex<Connection>,
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&config.raw_dir)?;

        let connection = Connection::open(&config.db_path)?;
        migrations::apply_migrations(&connection)?;
        info!(
            db_path = %config.db_path.display(),
            raw_dir = %config.raw_dir.display(),
            "warehouse opened"
        );

        Ok(Self {
            config,
            connection: Mutex::new(connection),
        })
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn raw_dir(&self) -> &Path {
        &self.config.raw_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn source_path(&self, dataset: &SourceDataset, stamp: &RunStamp) -> PathBuf {
        self.config
            .raw_dir
            .join(format!("{}_{}.parquet", dataset.source, stamp.label))
    }

    pub fn combined_path(&self, stamp: &RunStamp) -> PathBuf {
        self.config
            .raw_dir
            .join(format!("{COMBINED_PREFIX}_{}.parquet", stamp.label))
    }

    pub fn latest_path(&self) -> PathBuf {
        self.config
            .raw_dir
            .join(format!("{COMBINED_PREFIX}_latest.parquet"))
    }

    /// Writes one source dataset in canonical column order.
    pub fn write_source_dataset(
        &self,
        dataset: &SourceDataset,
        stamp: &RunStamp,
    ) -> Result<PersistedArtifact, WarehouseError> {
        let path = self.source_path(dataset, stamp);
        let connection = self.lock();
        let normalized = normalizer::normalize_source(dataset);
        let rows = export::write_parquet(&connection, &normalized, &path)?;
        let artifact = PersistedArtifact {
            kind: ArtifactKind::Source(dataset.source),
            location: path.display().to_string(),
            rows,
        };
        record_artifact(&connection, stamp, &artifact)?;
        Ok(artifact)
    }

    /// Writes the run's combined dataset and refreshes the latest alias.
    pub fn write_combined_dataset(
        &self,
        combined: &CombinedDataset,
        stamp: &RunStamp,
    ) -> Result<Vec<PersistedArtifact>, WarehouseError> {
        let path = self.combined_path(stamp);
        let latest = self.latest_path();
        let connection = self.lock();

        let rows = export::write_parquet(&connection, combined, &path)?;
        export::replace_with_copy(&path, &latest)?;

        let artifacts = vec![
            PersistedArtifact {
                kind: ArtifactKind::Combined,
                location: path.display().to_string(),
                rows,
            },
            PersistedArtifact {
                kind: ArtifactKind::Latest,
                location: latest.display().to_string(),
                rows,
            },
        ];
        for artifact in &artifacts {
            record_artifact(&connection, stamp, artifact)?;
        }
        Ok(artifacts)
    }

    /// Upserts the combined rows and the catalog in one transaction.
    pub fn upsert(
        &self,
        combined: &CombinedDataset,
        catalog: &Catalog,
    ) -> Result<(usize, usize), WarehouseError> {
        let connection = self.lock();
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(usize, usize), WarehouseError> {
            let mut observations = connection.prepare(
                r#"
INSERT OR REPLACE INTO observations (date, symbol, source, value, extras, updated_at)
VALUES (CAST(? AS DATE), ?, ?, ?, ?, CURRENT_TIMESTAMP)
"#,
            )?;
            for row in &combined.rows {
                let mut extras = Map::new();
                for (name, value) in combined.extra_columns.iter().zip(&row.extras) {
                    if let Some(value) = value {
                        extras.insert(name.clone(), serde_json::to_value(value)?);
                    }
                }
                let extras = if extras.is_empty() {
                    None
                } else {
                    Some(Value::Object(extras).to_string())
                };
                observations.execute(::duckdb::params![
                    row.date.to_string(),
                    row.symbol,
                    row.source.as_str(),
                    row.value,
                    extras,
                ])?;
            }

            let mut symbols = connection.prepare(
                r#"
INSERT OR REPLACE INTO symbols (source, symbol, description, unit, updated_at)
VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
"#,
            )?;
            for entry in catalog.entries() {
                symbols.execute(::duckdb::params![
                    entry.source.to_ascii_lowercase(),
                    entry.symbol,
                    entry.description,
                    entry.unit,
                ])?;
            }

            Ok((combined.len(), catalog.len()))
        })();

        let counts = finalize_transaction(&connection, result)?;
        info!(
            observations = counts.0,
            symbols = counts.1,
            "warehouse tables updated"
        );
        Ok(counts)
    }

    pub fn observation_count(&self) -> Result<i64, WarehouseError> {
        let connection = self.lock();
        Ok(connection.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?)
    }

    pub fn artifact_history(&self) -> Result<Vec<ArtifactRecord>, WarehouseError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            r#"
SELECT run_id, run_label, kind, source, path, row_count
FROM collection_artifacts
ORDER BY created_at, kind, path
"#,
        )?;
        let records = statement.query_map([], |row| {
            Ok(ArtifactRecord {
                run_id: row.get(0)?,
                run_label: row.get(1)?,
                kind: row.get(2)?,
                source: row.get(3)?,
                path: row.get(4)?,
                row_count: row.get(5)?,
            })
        })?;
        Ok(records.collect::<Result<Vec<_>, _>>()?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DatasetSink for Warehouse {
    fn persist_source(
        &self,
        dataset: &SourceDataset,
        stamp: &RunStamp,
    ) -> Result<PersistedArtifact, SinkError> {
        Ok(self.write_source_dataset(dataset, stamp)?)
    }

    fn persist_combined(
        &self,
        combined: &CombinedDataset,
        stamp: &RunStamp,
    ) -> Result<Vec<PersistedArtifact>, SinkError> {
        Ok(self.write_combined_dataset(combined, stamp)?)
    }

    fn publish(&self, combined: &CombinedDataset, catalog: &Catalog) -> Result<(), SinkError> {
        self.upsert(combined, catalog)?;
        Ok(())
    }
}

fn record_artifact(
    connection: &Connection,
    stamp: &RunStamp,
    artifact: &PersistedArtifact,
) -> Result<(), WarehouseError> {
    let (kind, source) = match &artifact.kind {
        ArtifactKind::Source(source) => ("source", Some(source.as_str())),
        ArtifactKind::Combined => ("combined", None),
        ArtifactKind::Latest => ("latest", None),
    };
    connection.execute(
        r#"
INSERT INTO collection_artifacts (run_id, run_label, kind, source, path, row_count, created_at)
VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
"#,
        ::duckdb::params![
            stamp.run_id.to_string(),
            stamp.label,
            kind,
            source,
            artifact.location,
            artifact.rows as i64,
        ],
    )?;
    Ok(())
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
