//! Retry with backoff around single-series fetches.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{DateRange, FetchError, Fetcher, RateLimiterSet, RawSeries, SourceId};

/// Wait between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `(attempt + 1) * base`, with `attempt` counted from zero.
    Linear { base: Duration },
    /// `base * factor^attempt`, capped at `max`, optionally with +/- 50% jitter.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay after the zero-based failed `attempt`.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Linear { base } => base.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt.min(i32::MAX as u32) as i32);
                let mut seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                if jitter {
                    seconds *= 0.5 + fastrand::f64();
                }

                Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(max)
            }
        }
    }
}

/// How many times to retry a failing fetch and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear { base },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound on fetch calls for one symbol.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// A symbol whose fetch kept failing, or failed in a way retrying cannot fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_id} '{symbol}' failed after {attempts} attempt(s): {error}")]
pub struct TerminalFetchError {
    pub symbol: String,
    pub source_id: SourceId,
    pub attempts: u32,
    pub error: FetchError,
}

/// Result of running one symbol through the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The fetcher answered; the series may be empty.
    Series(RawSeries),
    Failed(TerminalFetchError),
}

/// Runs a fetcher under the source's rate limit, retrying retryable failures.
///
/// An empty series is a valid answer and is returned without retrying.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    limiter: Arc<RateLimiterSet>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiterSet>) -> Self {
        Self { policy, limiter }
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute(
        &self,
        fetcher: &dyn Fetcher,
        source: SourceId,
        symbol: &str,
        range: DateRange,
    ) -> FetchOutcome {
        let mut attempt = 0_u32;
        loop {
            self.limiter.acquire(source).await;

            match fetcher.fetch_single_series(symbol, range).await {
                Ok(series) => {
                    if attempt > 0 {
                        debug!(source = %source, symbol, attempts = attempt + 1, "fetch recovered");
                    }
                    return FetchOutcome::Series(series);
                }
                Err(error) => {
                    let attempts = attempt + 1;
                    if !error.retryable() || attempt >= self.policy.max_retries {
                        warn!(
                            source = %source,
                            symbol,
                            attempts,
                            error_code = error.code(),
                            error = %error,
                            "fetch failed"
                        );
                        return FetchOutcome::Failed(TerminalFetchError {
                            symbol: symbol.to_owned(),
                            source_id: source,
                            attempts,
                            error,
                        });
                    }

                    let delay = self.policy.backoff.delay(attempt);
                    warn!(
                        source = %source,
                        symbol,
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
