//! Per-source sliding-window request limiting.
//!
//! Each grant reserves a time slot under a short lock and the caller sleeps until that slot
//! outside the lock. Slot `k` is never earlier than slot `k - max_requests` plus the window,
//! so no window of that length ever holds more than `max_requests` grants. Slots are handed
//! out in arrival order, which keeps waiting callers from starving.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::SourceId;

/// At most `max_requests` requests in any window of length `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    /// A zero request budget is raised to one.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Sliding-window limiter for one source.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: RateLimit,
    grants: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            grants: Mutex::new(VecDeque::with_capacity(limit.max_requests as usize)),
        }
    }

    pub const fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Waits until one more request fits in the window and records it.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let slot = {
            let mut grants = self.grants.lock().await;
            let now = Instant::now();
            let capacity = self.limit.max_requests as usize;

            let slot = if grants.len() < capacity {
                now
            } else {
                (grants[grants.len() - capacity] + self.limit.window).max(now)
            };

            while grants.len() >= capacity {
                grants.pop_front();
            }
            grants.push_back(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            sleep_until(slot).await;
        }
        wait
    }
}

/// One limiter per known source, shared by every task of a run.
#[derive(Debug, Clone)]
pub struct RateLimiterSet {
    limiters: Vec<Arc<SlidingWindowLimiter>>,
}

impl RateLimiterSet {
    /// Builds a limiter for every source; sources without an explicit limit use `default`.
    pub fn new(
        default: RateLimit,
        overrides: impl IntoIterator<Item = (SourceId, RateLimit)>,
    ) -> Self {
        let overrides: Vec<(SourceId, RateLimit)> = overrides.into_iter().collect();
        let limiters = SourceId::ALL
            .iter()
            .map(|source| {
                let limit = overrides
                    .iter()
                    .rev()
                    .find(|(candidate, _)| candidate == source)
                    .map_or(default, |(_, limit)| *limit);
                Arc::new(SlidingWindowLimiter::new(limit))
            })
            .collect();
        Self { limiters }
    }

    pub fn uniform(limit: RateLimit) -> Self {
        Self::new(limit, std::iter::empty())
    }

    pub fn limiter(&self, source: SourceId) -> Arc<SlidingWindowLimiter> {
        Arc::clone(&self.limiters[source as usize])
    }

    pub fn limit_for(&self, source: SourceId) -> RateLimit {
        self.limiters[source as usize].limit()
    }

    /// Blocks until `source` may issue one more request.
    pub async fn acquire(&self, source: SourceId) -> Duration {
        let waited = self.limiters[source as usize].acquire().await;
        if !waited.is_zero() {
            debug!(
                source = %source,
                waited_ms = waited.as_millis() as u64,
                "request delayed by rate limit"
            );
        }
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grants_beyond_budget_wait_for_the_window() {
        let limiter = SlidingWindowLimiter::new(RateLimit::new(2, Duration::from_secs(10)));
        let started = Instant::now();

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        limiter.acquire().await;

        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_periods_restore_the_budget() {
        let limiter = SlidingWindowLimiter::new(RateLimit::new(1, Duration::from_secs(5)));

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_limited_independently() {
        let set = RateLimiterSet::new(
            RateLimit::new(1, Duration::from_secs(60)),
            [(SourceId::Fred, RateLimit::new(3, Duration::from_secs(60)))],
        );
        let started = Instant::now();

        set.acquire(SourceId::Yahoo).await;
        set.acquire(SourceId::Fred).await;
        set.acquire(SourceId::Fred).await;
        set.acquire(SourceId::Eia).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(set.limit_for(SourceId::Fred).max_requests, 3);
        assert_eq!(set.limit_for(SourceId::Occ).max_requests, 1);
    }

    #[test]
    fn zero_budget_is_raised_to_one() {
        assert_eq!(RateLimit::new(0, Duration::from_secs(1)).max_requests, 1);
    }
}
