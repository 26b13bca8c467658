//! Collection orchestration core for macrofetch.
//!
//! A run takes a catalog of `(symbol, source)` pairs and fans out twice: one task per
//! requested source, then a bounded pool of per-symbol fetch tasks inside each source.
//! Every fetch attempt passes the source's [`RateLimiterSet`] gate and is wrapped by the
//! [`RetryExecutor`]. Per-source results become [`SourceDataset`]s which the
//! [`normalizer`] merges into one [`CombinedDataset`].
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`source`] | fixed [`SourceId`] enumeration |
//! | [`fetcher`] | [`Fetcher`] trait, [`FetchError`], [`FetcherRegistry`] |
//! | [`adapters`] | live HTTP adapters and the synthetic fetcher |
//! | [`rate_limit`] | sliding-window limiter per source |
//! | [`retry`] | backoff and the retry executor |
//! | [`collector`] | per-source worker pool |
//! | [`orchestrator`] | per-run fan-out and persistence hand-off |
//! | [`normalizer`] | canonical long-format merge |
//! | [`sink`] | persistence seam implemented by the warehouse crate |
//! | [`config`] | typed configuration with documented env aliases |

pub mod adapters;
pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod normalizer;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod sink;
pub mod source;

pub use collector::{
    CollectorSettings, FailedSymbol, FailureReason, SourceCollection, SourceCollector,
    SourceSummary,
};
pub use config::{CollectorConfig, ConfigError};
pub use domain::{
    Catalog, CatalogSummary, CombinedDataset, CombinedRow, DateRange, FieldValue, Observation,
    ObservationDate, RawSeries, SeriesPoint, SourceDataset, SymbolEntry,
};
pub use error::{CoreError, ValidationError};
pub use fetcher::{
    FetchError, FetchErrorKind, Fetcher, FetcherRegistry, FetcherRegistryBuilder, SeriesFuture,
};
pub use orchestrator::{
    CollectionOrchestrator, CollectionRequest, FailureStage, RunOutcome, RunReport,
    SourceFailure, SourceSelection,
};
pub use rate_limit::{RateLimit, RateLimiterSet, SlidingWindowLimiter};
pub use retry::{Backoff, FetchOutcome, RetryExecutor, RetryPolicy, TerminalFetchError};
pub use sink::{ArtifactKind, DatasetSink, MemorySink, PersistedArtifact, RunStamp, SinkError};
pub use source::{IdentifierKind, SourceId};
