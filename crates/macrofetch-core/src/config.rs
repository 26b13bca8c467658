//! Typed configuration built once at startup.
//!
//! Every setting has a documented list of environment keys; the first key holding a
//! non-blank value wins, otherwise the built-in default applies.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::{
    Backoff, CollectorSettings, ObservationDate, RateLimit, RateLimiterSet, RetryPolicy, SourceId,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub db_path: PathBuf,
    pub catalog_path: PathBuf,
    /// The catalog path was set explicitly, so a missing file is an error.
    pub catalog_explicit: bool,
    pub max_workers: usize,
    pub source_workers: usize,
    pub progress_every: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub rate_limits: BTreeMap<SourceId, RateLimit>,
    pub default_start_dates: BTreeMap<SourceId, ObservationDate>,
    pub credentials: BTreeMap<SourceId, String>,
    pub log_filter: String,
}

impl CollectorConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        let data_dir = env
            .first(&["MACROFETCH_DATA_DIR", "DATA_DIR"])
            .map_or_else(|| PathBuf::from("data"), |(_, value)| PathBuf::from(value));
        let raw_dir = env
            .first(&["MACROFETCH_RAW_DATA_DIR", "RAW_DATA_DIR"])
            .map_or_else(|| data_dir.join("raw"), |(_, value)| PathBuf::from(value));
        let db_path = env
            .first(&["MACROFETCH_DB_PATH", "DUCKDB_PATH"])
            .map_or_else(
                || data_dir.join("macrofetch.duckdb"),
                |(_, value)| PathBuf::from(value),
            );
        let (catalog_path, catalog_explicit) = env
            .first(&["MACROFETCH_CATALOG", "SYMBOLS_CSV"])
            .map_or_else(
                || (data_dir.join("symbols.csv"), false),
                |(_, value)| (PathBuf::from(value), true),
            );

        let max_retries: u32 = env.number(&["MACROFETCH_MAX_RETRIES", "API_MAX_RETRIES"], 3, 0)?;
        let base_wait: u64 =
            env.number(&["MACROFETCH_BASE_WAIT_SECS", "API_BASE_WAIT_TIME"], 30, 0)?;
        let backoff = match env.first(&["MACROFETCH_BACKOFF"]) {
            None => Backoff::Linear {
                base: Duration::from_secs(base_wait),
            },
            Some((key, value)) => parse_backoff(&key, &value, Duration::from_secs(base_wait))?,
        };
        let timeout: u64 =
            env.number(&["MACROFETCH_REQUEST_TIMEOUT_SECS", "API_TIMEOUT"], 60, 1)?;

        let mut rate_limits = BTreeMap::new();
        let mut default_start_dates = BTreeMap::new();
        let mut credentials = BTreeMap::new();
        for source in SourceId::ALL {
            let prefix = source.env_prefix();
            let (default_requests, default_window) = builtin_rate_limit(source);
            let max_requests: u32 = env.number(
                &[
                    format!("MACROFETCH_{prefix}_MAX_REQUESTS"),
                    format!("{prefix}_MAX_REQUESTS"),
                    String::from("DEFAULT_MAX_REQUESTS"),
                ],
                default_requests,
                1,
            )?;
            let window: u64 = env.number(
                &[
                    format!("MACROFETCH_{prefix}_TIME_WINDOW"),
                    format!("{prefix}_TIME_WINDOW"),
                    String::from("DEFAULT_TIME_WINDOW"),
                ],
                default_window,
                1,
            )?;
            rate_limits.insert(
                source,
                RateLimit::new(max_requests, Duration::from_secs(window)),
            );

            let start = match env.first(&[
                format!("MACROFETCH_{prefix}_START_DATE"),
                format!("{prefix}_DEFAULT_START_DATE"),
                String::from("DEFAULT_START_DATE"),
            ]) {
                Some((key, value)) => {
                    ObservationDate::parse(&value).map_err(|error| ConfigError::InvalidValue {
                        key,
                        value: value.clone(),
                        reason: error.to_string(),
                    })?
                }
                None => builtin_start_date(source),
            };
            default_start_dates.insert(source, start);

            if let Some((key, value)) = env.first(&[
                format!("MACROFETCH_{prefix}_API_KEY"),
                format!("{prefix}_API_KEY"),
                format!("{prefix}_TOKEN"),
                format!("{prefix}_KEY"),
                format!("API_KEY_{prefix}"),
            ]) {
                debug!(source = %source, key, "credential found");
                credentials.insert(source, value);
            }
        }

        Ok(Self {
            data_dir,
            raw_dir,
            db_path,
            catalog_path,
            catalog_explicit,
            max_workers: env.number(&["MACROFETCH_MAX_WORKERS", "MAX_WORKERS"], 10, 1)?,
            source_workers: env.number(&["MACROFETCH_SOURCE_WORKERS", "PROCESS_WORKERS"], 8, 1)?,
            progress_every: env.number(&["MACROFETCH_PROGRESS_EVERY"], 10, 1)?,
            retry: RetryPolicy {
                max_retries,
                backoff,
            },
            request_timeout: Duration::from_secs(timeout),
            rate_limits,
            default_start_dates,
            credentials,
            log_filter: env
                .first(&["MACROFETCH_LOG", "RUST_LOG", "LOG_LEVEL"])
                .map_or_else(|| String::from("info"), |(_, value)| value),
        })
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            max_workers: self.max_workers,
            retry: self.retry,
            progress_every: self.progress_every,
        }
    }

    pub fn rate_limiter_set(&self) -> RateLimiterSet {
        RateLimiterSet::new(
            RateLimit::default(),
            self.rate_limits
                .iter()
                .map(|(source, limit)| (*source, *limit)),
        )
    }

    pub fn default_start(&self, source: SourceId) -> ObservationDate {
        self.default_start_dates
            .get(&source)
            .copied()
            .unwrap_or_else(|| builtin_start_date(source))
    }

    /// Replaces the linear backoff base, keeping the configured shape.
    pub fn set_base_wait(&mut self, base: Duration) {
        self.retry.backoff = match self.retry.backoff {
            Backoff::Linear { .. } => Backoff::Linear { base },
            Backoff::Exponential {
                factor, max, jitter, ..
            } => Backoff::Exponential {
                base,
                factor,
                max,
                jitter,
            },
        };
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let mut rate_limits = BTreeMap::new();
        let mut default_start_dates = BTreeMap::new();
        for source in SourceId::ALL {
            let (requests, window) = builtin_rate_limit(source);
            rate_limits.insert(source, RateLimit::new(requests, Duration::from_secs(window)));
            default_start_dates.insert(source, builtin_start_date(source));
        }
        let data_dir = PathBuf::from("data");
        Self {
            raw_dir: data_dir.join("raw"),
            db_path: data_dir.join("macrofetch.duckdb"),
            catalog_path: data_dir.join("symbols.csv"),
            data_dir,
            catalog_explicit: false,
            max_workers: 10,
            source_workers: 8,
            progress_every: 10,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
            rate_limits,
            default_start_dates,
            credentials: BTreeMap::new(),
            log_filter: String::from("info"),
        }
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// First key with a non-blank value, as `(key, trimmed value)`.
    fn first<S: AsRef<str>>(&self, keys: &[S]) -> Option<(String, String)> {
        keys.iter().find_map(|key| {
            let key = key.as_ref();
            let value = (self.0)(key)?;
            let value = value.trim();
            (!value.is_empty()).then(|| (key.to_owned(), value.to_owned()))
        })
    }

    fn number<S, T>(&self, keys: &[S], default: T, minimum: T) -> Result<T, ConfigError>
    where
        S: AsRef<str>,
        T: FromStr + PartialOrd + std::fmt::Display + Copy,
    {
        let Some((key, value)) = self.first(keys) else {
            return Ok(default);
        };
        let parsed = value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.clone(),
            value: value.clone(),
            reason: String::from("expected a non-negative integer"),
        })?;
        if parsed < minimum {
            return Err(ConfigError::InvalidValue {
                key,
                value,
                reason: format!("must be at least {minimum}"),
            });
        }
        Ok(parsed)
    }
}

fn parse_backoff(key: &str, value: &str, base: Duration) -> Result<Backoff, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "linear" => Ok(Backoff::Linear { base }),
        "exponential" => Ok(Backoff::Exponential {
            base,
            factor: 2.0,
            max: base.saturating_mul(8),
            jitter: true,
        }),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            reason: String::from("expected 'linear' or 'exponential'"),
        }),
    }
}

const fn builtin_rate_limit(source: SourceId) -> (u32, u64) {
    match source {
        SourceId::Fred => (120, 60),
        SourceId::Eia => (5_000, 3_600),
        _ => (60, 60),
    }
}

fn builtin_start_date(source: SourceId) -> ObservationDate {
    let year = match source {
        SourceId::Yahoo => 1990,
        SourceId::Finra => 2010,
        SourceId::Baker | SourceId::Sp500 | SourceId::Usda => 2000,
        SourceId::Fred | SourceId::Eia | SourceId::Occ => 1900,
    };
    ObservationDate::from_date(
        time::Date::from_ordinal_date(year, 1).unwrap_or(time::Date::MIN),
    )
}
