use thiserror::Error;

use crate::config::ConfigError;
use crate::sink::SinkError;
use crate::SourceId;

/// Validation and contract errors exposed by `macrofetch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error(
        "invalid source '{value}', expected one of yahoo, fred, eia, baker, finra, sp500, usda, occ"
    )]
    InvalidSource { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: String, end: String },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
}

/// Top-level error type for orchestration.
///
/// Only configuration problems and a failed combined write surface here; per-symbol and
/// per-source failures are recorded in the run report instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no fetcher registered for source '{source_id}'")]
    UnregisteredSource { source_id: SourceId },

    #[error("failed to persist {target}: {source}")]
    Persistence {
        target: String,
        #[source]
        source: SinkError,
    },
}

impl CoreError {
    /// True for errors raised before any fetch started.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Config(_) | Self::UnregisteredSource { .. }
        )
    }
}
