use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::SourceId;

/// One catalog row. `source` stays a raw string: unknown sources may appear in a catalog
/// and are simply never selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: String,
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
}

impl SymbolEntry {
    pub fn new(symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            description: String::new(),
            unit: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    fn key(&self) -> (String, String) {
        (
            self.source.trim().to_ascii_lowercase(),
            self.symbol.trim().to_owned(),
        )
    }
}

/// Immutable symbol catalog for one run, unique on `(symbol, source)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    entries: Vec<SymbolEntry>,
}

impl Catalog {
    /// Builds a catalog, trimming fields and dropping blank symbols and later duplicates.
    pub fn from_entries(entries: impl IntoIterator<Item = SymbolEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut duplicates = 0_usize;
        let mut blanks = 0_usize;

        for mut entry in entries {
            entry.symbol = entry.symbol.trim().to_owned();
            entry.source = entry.source.trim().to_owned();
            if entry.symbol.is_empty() || entry.source.is_empty() {
                blanks += 1;
                continue;
            }
            if seen.insert(entry.key()) {
                kept.push(entry);
            } else {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!(duplicates, "catalog contained duplicate (symbol, source) entries");
        }
        if blanks > 0 {
            warn!(blanks, "catalog contained entries without symbol or source");
        }

        Self { entries: kept }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Entries whose source matches `source` case-insensitively, in catalog order.
    pub fn entries_for(&self, source: SourceId) -> Vec<&SymbolEntry> {
        self.entries
            .iter()
            .filter(|entry| source.matches(&entry.source))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> CatalogSummary {
        let mut per_source = BTreeMap::new();
        let mut unknown_sources = BTreeMap::new();
        for entry in &self.entries {
            match entry.source.parse::<SourceId>() {
                Ok(source) => *per_source.entry(source).or_insert(0) += 1,
                Err(_) => *unknown_sources
                    .entry(entry.source.to_ascii_lowercase())
                    .or_insert(0) += 1,
            }
        }
        CatalogSummary {
            total: self.entries.len(),
            per_source,
            unknown_sources,
        }
    }
}

/// Per-source symbol counts of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub total: usize,
    pub per_source: BTreeMap<SourceId, usize>,
    pub unknown_sources: BTreeMap<String, usize>,
}
