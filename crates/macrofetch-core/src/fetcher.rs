//! The per-source fetch capability and the static registry of adapters.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapters::{EiaFetcher, FredFetcher, SyntheticFetcher, YahooFetcher};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::{CollectorConfig, DateRange, RawSeries, SourceId};

pub type SeriesFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>>;

/// Fetches one series for one symbol.
///
/// Implementations return an empty [`RawSeries`] when the symbol legitimately has no data
/// in range and an error for anything that might succeed on another attempt.
pub trait Fetcher: Send + Sync {
    fn fetch_single_series<'a>(&'a self, symbol: &'a str, range: DateRange) -> SeriesFuture<'a>;
}

/// Failure category of a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    RateLimited,
    Upstream,
    Parse,
    Unauthorized,
    InvalidRequest,
    NotFound,
}

/// Error returned by a fetcher for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Upstream, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unauthorized, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    /// Maps a non-success HTTP status onto a fetch error.
    pub fn from_status(status: u16, context: &str) -> Self {
        let message = format!("{context}: upstream returned status {status}");
        match status {
            429 => Self::rate_limited(message),
            401 | 403 => Self::unauthorized(message),
            404 => Self::not_found(message),
            400..=499 => Self::invalid_request(message),
            _ => Self::upstream(message),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether another attempt could plausibly succeed.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Transport
                | FetchErrorKind::RateLimited
                | FetchErrorKind::Upstream
                | FetchErrorKind::Parse
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Transport => "fetch.transport",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::Upstream => "fetch.upstream",
            FetchErrorKind::Parse => "fetch.parse",
            FetchErrorKind::Unauthorized => "fetch.unauthorized",
            FetchErrorKind::InvalidRequest => "fetch.invalid_request",
            FetchErrorKind::NotFound => "fetch.not_found",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for FetchError {}

/// Static mapping from source id to its fetcher, built once at startup.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: BTreeMap<SourceId, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn get(&self, source: SourceId) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(&source).cloned()
    }

    pub fn contains(&self, source: SourceId) -> bool {
        self.fetchers.contains_key(&source)
    }

    /// Registered sources in declaration order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.fetchers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl Debug for FetcherRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistryMode {
    Live,
    Mock,
    Custom,
}

/// Builder for [`FetcherRegistry`].
///
/// Live adapters need credentials for FRED and EIA; sources left without an adapter stay
/// unregistered and requesting them fails before a run starts.
pub struct FetcherRegistryBuilder {
    mode: RegistryMode,
    http_client: Option<Arc<dyn HttpClient>>,
    credentials: BTreeMap<SourceId, String>,
    request_timeout: Duration,
    overrides: Vec<(SourceId, Arc<dyn Fetcher>)>,
}

impl Default for FetcherRegistryBuilder {
    fn default() -> Self {
        Self {
            mode: RegistryMode::Live,
            http_client: None,
            credentials: BTreeMap::new(),
            request_timeout: Duration::from_secs(60),
            overrides: Vec::new(),
        }
    }
}

impl FetcherRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks up credentials and the per-attempt timeout from the typed config.
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            request_timeout: config.request_timeout,
            ..Self::default()
        }
    }

    /// Starts with no adapters at all; only fetchers added with
    /// [`with_fetcher`](Self::with_fetcher) are registered.
    pub fn custom() -> Self {
        Self {
            mode: RegistryMode::Custom,
            ..Self::default()
        }
    }

    /// Registers the deterministic synthetic fetcher for every known source.
    pub fn with_mock_mode(mut self) -> Self {
        self.mode = RegistryMode::Mock;
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_credential(mut self, source: SourceId, credential: impl Into<String>) -> Self {
        self.credentials.insert(source, credential.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Registers a specific fetcher, replacing whatever the mode would have chosen.
    pub fn with_fetcher(mut self, source: SourceId, fetcher: Arc<dyn Fetcher>) -> Self {
        self.overrides.push((source, fetcher));
        self
    }

    pub fn build(self) -> FetcherRegistry {
        let mut fetchers: BTreeMap<SourceId, Arc<dyn Fetcher>> = BTreeMap::new();

        match self.mode {
            RegistryMode::Mock => {
                for source in SourceId::ALL {
                    fetchers.insert(source, Arc::new(SyntheticFetcher::new(source)));
                }
            }
            RegistryMode::Live => self.register_live_adapters(&mut fetchers),
            RegistryMode::Custom => {}
        }

        for (source, fetcher) in self.overrides {
            fetchers.insert(source, fetcher);
        }

        let registry = FetcherRegistry { fetchers };
        info!(sources = ?registry.sources(), mode = ?self.mode, "fetcher registry built");
        registry
    }

    fn register_live_adapters(&self, fetchers: &mut BTreeMap<SourceId, Arc<dyn Fetcher>>) {
        let http_client = self
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let timeout = self.request_timeout;

        fetchers.insert(
            SourceId::Yahoo,
            Arc::new(YahooFetcher::new(Arc::clone(&http_client)).with_timeout(timeout)),
        );

        match self.credentials.get(&SourceId::Fred) {
            Some(api_key) => {
                fetchers.insert(
                    SourceId::Fred,
                    Arc::new(
                        FredFetcher::new(Arc::clone(&http_client), api_key.clone())
                            .with_timeout(timeout),
                    ),
                );
            }
            None => warn!(source = %SourceId::Fred, "no credential configured; source disabled"),
        }

        match self.credentials.get(&SourceId::Eia) {
            Some(api_key) => {
                fetchers.insert(
                    SourceId::Eia,
                    Arc::new(
                        EiaFetcher::new(Arc::clone(&http_client), api_key.clone())
                            .with_timeout(timeout),
                    ),
                );
            }
            None => warn!(source = %SourceId::Eia, "no credential configured; source disabled"),
        }
    }
}
