//! Reusable per-key token bucket, shared by the pipeline trigger throttle
//! and the webhook admission throttle, generalized from per-IP HTTP
//! limiting to an arbitrary string key.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::sync::RwLock;

type KeyedLimiter = GovernorLimiter<String, dashmap::DashMap<String, governor::state::InMemoryState>, governor::clock::DefaultClock>;

pub struct TokenBucket {
    limiter: KeyedLimiter,
    burst: u32,
}

impl TokenBucket {
    /// `rate_per_minute` replenishment, `burst` maximum tokens held at once.
    pub fn new(rate_per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_per_minute.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        Self { limiter: GovernorLimiter::dashmap(quota), burst }
    }

    /// `true` if a token was available for `key` and consumed.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// Keeps one `TokenBucket` per named scope (e.g. one per repository for
/// pipeline triggers, one per webhook source), created lazily.
pub struct RateLimiterRegistry {
    buckets: Arc<RwLock<HashMap<String, Arc<TokenBucket>>>>,
    rate_per_minute: u32,
    burst: u32,
}

impl RateLimiterRegistry {
    pub fn new(rate_per_minute: u32, burst: u32) -> Self {
        Self { buckets: Arc::new(RwLock::new(HashMap::new())), rate_per_minute, burst }
    }

    pub async fn try_acquire(&self, scope: &str) -> bool {
        if let Some(bucket) = self.buckets.read().await.get(scope) {
            return bucket.try_acquire(scope);
        }
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.rate_per_minute, self.burst)))
            .clone();
        bucket.try_acquire(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_initial_spike_then_throttles() {
        let bucket = TokenBucket::new(10, 3);
        assert!(bucket.try_acquire("repo-a"));
        assert!(bucket.try_acquire("repo-a"));
        assert!(bucket.try_acquire("repo-a"));
        assert!(!bucket.try_acquire("repo-a"));
    }

    #[tokio::test]
    async fn registry_tracks_independent_scopes() {
        let registry = RateLimiterRegistry::new(10, 1);
        assert!(registry.try_acquire("a").await);
        assert!(!registry.try_acquire("a").await);
        assert!(registry.try_acquire("b").await);
    }
}
