use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identifiers for every source the collector knows about.
///
/// Ordering follows declaration order and is what makes merged output deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Yahoo,
    Fred,
    Eia,
    Baker,
    Finra,
    Sp500,
    Usda,
    Occ,
}

/// How a source names the series it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Symbol,
    Series,
}

impl SourceId {
    pub const ALL: [Self; 8] = [
        Self::Yahoo,
        Self::Fred,
        Self::Eia,
        Self::Baker,
        Self::Finra,
        Self::Sp500,
        Self::Usda,
        Self::Occ,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Fred => "fred",
            Self::Eia => "eia",
            Self::Baker => "baker",
            Self::Finra => "finra",
            Self::Sp500 => "sp500",
            Self::Usda => "usda",
            Self::Occ => "occ",
        }
    }

    /// Upper-case form used to build environment keys (`FRED_MAX_REQUESTS`).
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Yahoo => "YAHOO",
            Self::Fred => "FRED",
            Self::Eia => "EIA",
            Self::Baker => "BAKER",
            Self::Finra => "FINRA",
            Self::Sp500 => "SP500",
            Self::Usda => "USDA",
            Self::Occ => "OCC",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Yahoo => "Yahoo Finance daily prices",
            Self::Fred => "Federal Reserve Economic Data",
            Self::Eia => "Energy Information Administration series",
            Self::Baker => "Baker Hughes rig counts",
            Self::Finra => "FINRA margin statistics",
            Self::Sp500 => "S&P 500 earnings and estimates",
            Self::Usda => "USDA agricultural statistics",
            Self::Occ => "OCC options and futures volume",
        }
    }

    pub const fn identifier_kind(self) -> IdentifierKind {
        match self {
            Self::Fred | Self::Eia => IdentifierKind::Series,
            _ => IdentifierKind::Symbol,
        }
    }

    /// Case-insensitive comparison against a raw catalog source string.
    pub fn matches(self, raw: &str) -> bool {
        raw.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or(ValidationError::InvalidSource { value: normalized })
    }
}
