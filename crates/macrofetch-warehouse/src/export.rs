//! Parquet export of canonical datasets.
//!
//! Rows are staged in a temporary DuckDB table typed from the data, copied to
//! `<target>.partial` and renamed into place, so a reader never sees a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection};
use macrofetch_core::{CombinedDataset, FieldValue};
use tracing::debug;

use crate::{
    escape_sql_string, finalize_transaction, path_to_sql, quote_identifier, WarehouseError,
};

const STAGE_TABLE: &str = "export_stage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    BigInt,
    Double,
    Varchar,
}

impl ColumnType {
    const fn sql(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Varchar => "VARCHAR",
        }
    }

    fn to_value(self, value: Option<&FieldValue>) -> DuckValue {
        match (self, value) {
            (_, None) => DuckValue::Null,
            (Self::BigInt, Some(FieldValue::Int(value))) => DuckValue::BigInt(*value),
            (Self::Double, Some(FieldValue::Int(value))) => DuckValue::Double(*value as f64),
            (Self::Double, Some(FieldValue::Float(value))) => DuckValue::Double(*value),
            (_, Some(other)) => DuckValue::Text(other.to_string()),
        }
    }
}

/// Narrowest column type that holds every value of extra column `index`.
fn infer_column_type(combined: &CombinedDataset, index: usize) -> ColumnType {
    let mut inferred: Option<ColumnType> = None;
    for row in &combined.rows {
        let next = match row.extras.get(index) {
            Some(Some(FieldValue::Int(_))) => ColumnType::BigInt,
            Some(Some(FieldValue::Float(_))) => ColumnType::Double,
            Some(Some(FieldValue::Text(_))) => return ColumnType::Varchar,
            _ => continue,
        };
        inferred = Some(match (inferred, next) {
            (None, next) => next,
            (Some(ColumnType::BigInt), ColumnType::BigInt) => ColumnType::BigInt,
            _ => ColumnType::Double,
        });
    }
    inferred.unwrap_or(ColumnType::Varchar)
}

/// Writes `combined` to `target` as parquet and returns the row count.
pub(crate) fn write_parquet(
    connection: &Connection,
    combined: &CombinedDataset,
    target: &Path,
) -> Result<usize, WarehouseError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let types: Vec<ColumnType> = (0..combined.extra_columns.len())
        .map(|index| infer_column_type(combined, index))
        .collect();

    let mut definitions = vec![
        String::from("date DATE"),
        String::from("symbol VARCHAR"),
        String::from("value DOUBLE"),
        String::from("source VARCHAR"),
    ];
    definitions.extend(
        combined
            .extra_columns
            .iter()
            .zip(&types)
            .map(|(name, column_type)| format!("{} {}", quote_identifier(name), column_type.sql())),
    );
    connection.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {STAGE_TABLE} ({});",
        definitions.join(", ")
    ))?;

    let placeholders = std::iter::once("CAST(? AS DATE)")
        .chain(std::iter::repeat("?").take(3 + types.len()))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!("INSERT INTO {STAGE_TABLE} VALUES ({placeholders})");

    connection.execute_batch("BEGIN TRANSACTION")?;
    let staged = (|| -> Result<(), WarehouseError> {
        let mut statement = connection.prepare(&insert)?;
        for row in &combined.rows {
            let mut values = vec![
                DuckValue::Text(row.date.to_string()),
                DuckValue::Text(row.symbol.clone()),
                DuckValue::Double(row.value),
                DuckValue::Text(row.source.to_string()),
            ];
            values.extend(
                types
                    .iter()
                    .zip(&row.extras)
                    .map(|(column_type, value)| column_type.to_value(value.as_ref())),
            );
            statement.execute(params_from_iter(values))?;
        }
        Ok(())
    })();
    finalize_transaction(connection, staged)?;

    let partial = partial_path(target);
    let copied = connection.execute_batch(&format!(
        "COPY {STAGE_TABLE} TO '{}' (FORMAT PARQUET);",
        escape_sql_string(&path_to_sql(&partial))
    ));
    let _ = connection.execute_batch(&format!("DROP TABLE IF EXISTS {STAGE_TABLE};"));
    if let Err(error) = copied {
        let _ = fs::remove_file(&partial);
        return Err(error.into());
    }

    fs::rename(&partial, target)?;
    debug!(path = %target.display(), rows = combined.len(), "parquet written");
    Ok(combined.len())
}

/// Replaces `alias` with a copy of `source` without exposing a partial file.
pub(crate) fn replace_with_copy(source: &Path, alias: &Path) -> Result<(), WarehouseError> {
    let partial = partial_path(alias);
    fs::copy(source, &partial)?;
    fs::rename(&partial, alias)?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
