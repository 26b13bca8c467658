//! Symbol catalog loading from CSV.

use std::path::Path;

use ::duckdb::Connection;
use macrofetch_core::{Catalog, SymbolEntry};
use tracing::{info, warn};

use crate::{escape_sql_string, path_to_sql, quote_identifier, WarehouseError};

const SYMBOL_COLUMNS: &[&str] = &["symbol", "series_id"];
const SOURCE_COLUMNS: &[&str] = &["source", "string_source", "data_source"];
const DESCRIPTION_COLUMNS: &[&str] = &["description"];
const UNIT_COLUMNS: &[&str] = &["unit", "units"];

/// Loads the catalog at `path`.
///
/// A missing file is an error only when the path was given explicitly; otherwise the run
/// continues with an empty catalog.
pub fn load_catalog(path: &Path, explicit: bool) -> Result<Catalog, WarehouseError> {
    if !path.exists() {
        if explicit {
            return Err(WarehouseError::CatalogMissing {
                path: path.to_path_buf(),
            });
        }
        warn!(path = %path.display(), "catalog file not found, continuing with an empty catalog");
        return Ok(Catalog::empty());
    }

    let connection = Connection::open_in_memory()?;
    let relation = format!(
        "read_csv_auto('{}', header = true, all_varchar = true)",
        escape_sql_string(&path_to_sql(path))
    );

    let columns = {
        let mut statement = connection.prepare(&format!("DESCRIBE SELECT * FROM {relation}"))?;
        let names = statement.query_map([], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<_>, _>>()?
    };

    let invalid = |reason: String| WarehouseError::InvalidCatalog {
        path: path.to_path_buf(),
        reason,
    };
    let symbol = pick_column(&columns, SYMBOL_COLUMNS)
        .ok_or_else(|| invalid(format!("no symbol column among {columns:?}")))?;
    let source = pick_column(&columns, SOURCE_COLUMNS)
        .ok_or_else(|| invalid(format!("no source column among {columns:?}")))?;
    let description = pick_column(&columns, DESCRIPTION_COLUMNS);
    let unit = pick_column(&columns, UNIT_COLUMNS);

    let optional = |column: Option<&String>| {
        column.map_or_else(|| String::from("NULL"), |name| quote_identifier(name))
    };
    let query = format!(
        "SELECT {}, {}, {}, {} FROM {relation}",
        quote_identifier(symbol),
        quote_identifier(source),
        optional(description),
        optional(unit),
    );

    let mut statement = connection.prepare(&query)?;
    let rows = statement.query_map([], |row| {
        Ok((
            row.get::<_, Option<String>>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (symbol, source, description, unit) = row?;
        let mut entry = SymbolEntry::new(symbol.unwrap_or_default(), source.unwrap_or_default());
        if let Some(description) = description {
            entry = entry.with_description(description);
        }
        if let Some(unit) = unit {
            entry = entry.with_unit(unit);
        }
        entries.push(entry);
    }

    let catalog = Catalog::from_entries(entries);
    let summary = catalog.summary();
    info!(
        path = %path.display(),
        entries = summary.total,
        per_source = ?summary.per_source,
        "catalog loaded"
    );
    if !summary.unknown_sources.is_empty() {
        warn!(unknown_sources = ?summary.unknown_sources, "catalog names sources with no fetcher");
    }
    Ok(catalog)
}

fn pick_column<'a>(columns: &'a [String], candidates: &[&str]) -> Option<&'a String> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|column| column.trim().eq_ignore_ascii_case(candidate))
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use macrofetch_core::SourceId;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn reads_alias_columns_and_optional_fields() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("symbols.csv");
        fs::write(
            &path,
            "series_id,data_source,units\nGDP,fred,Billions\nAAPL,Yahoo,\nGDP,FRED,dup\n",
        )
        .expect("write csv");

        let catalog = load_catalog(&path, true).expect("catalog");

        assert_eq!(catalog.len(), 2);
        let fred = catalog.entries_for(SourceId::Fred);
        assert_eq!(fred[0].symbol, "GDP");
        assert_eq!(fred[0].unit, "Billions");
        assert_eq!(catalog.entries_for(SourceId::Yahoo)[0].description, "");
    }

    #[test]
    fn missing_file_depends_on_how_it_was_chosen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("absent.csv");

        assert!(load_catalog(&path, false).expect("implicit").is_empty());
        assert!(matches!(
            load_catalog(&path, true),
            Err(WarehouseError::CatalogMissing { .. })
        ));
    }

    #[test]
    fn catalog_without_source_column_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("symbols.csv");
        fs::write(&path, "symbol,name\nAAPL,Apple\n").expect("write csv");

        assert!(matches!(
            load_catalog(&path, true),
            Err(WarehouseError::InvalidCatalog { .. })
        ));
    }
}
