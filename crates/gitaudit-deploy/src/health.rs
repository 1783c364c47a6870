//! Downstream health-check capability for the Verify step: a bounded-retry
//! poll of one deployment's health endpoint over a `reqwest::Client`
//! under a timeout.

use std::time::Duration;

use async_trait::async_trait;
use gitaudit_core::{GitopsError, GitopsResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct HealthResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, url: &str) -> GitopsResult<HealthResponse>;
}

pub struct ReqwestHealthChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestHealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }
}

impl Default for ReqwestHealthChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl HealthChecker for ReqwestHealthChecker {
    async fn check(&self, url: &str) -> GitopsResult<HealthResponse> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| GitopsError::timeout(format!("health check at {url} timed out")))?
            .map_err(|e| GitopsError::transport(format!("health check at {url} failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HealthResponse { status, body })
    }
}

/// `200` plus, when a substring predicate is configured, that the body
/// contains it. Absent a predicate, status alone decides.
pub fn satisfies(response: &HealthResponse, body_contains: Option<&str>) -> bool {
    response.status == 200 && body_contains.map(|needle| response.body.contains(needle)).unwrap_or(true)
}

/// Polls up to `max_attempts` times, `interval` apart, stopping as soon as
/// `satisfies` passes. Returns `Ok(true)` if it ever passed, `Ok(false)` if
/// every attempt failed the predicate, and propagates the last transport
/// error only if every attempt errored outright.
pub async fn poll_until_healthy(
    checker: &dyn HealthChecker,
    url: &str,
    body_contains: Option<&str>,
    max_attempts: u32,
    interval: Duration,
) -> GitopsResult<bool> {
    let mut last_error = None;
    for attempt in 0..max_attempts {
        match checker.check(url).await {
            Ok(response) if satisfies(&response, body_contains) => return Ok(true),
            Ok(_) => last_error = None,
            Err(error) => last_error = Some(error),
        }
        if attempt + 1 < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    if let Some(error) = last_error {
        return Err(error);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyThenHealthy {
        calls: AtomicUsize,
        healthy_from: usize,
    }

    #[async_trait]
    impl HealthChecker for FlakyThenHealthy {
        async fn check(&self, _url: &str) -> GitopsResult<HealthResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.healthy_from {
                Ok(HealthResponse { status: 200, body: "ok".to_string() })
            } else {
                Ok(HealthResponse { status: 503, body: "unavailable".to_string() })
            }
        }
    }

    #[tokio::test]
    async fn stops_polling_as_soon_as_healthy() {
        let checker = FlakyThenHealthy { calls: AtomicUsize::new(0), healthy_from: 2 };
        let healthy = poll_until_healthy(&checker, "http://svc/health", None, 30, Duration::from_millis(1)).await.unwrap();
        assert!(healthy);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_when_never_healthy() {
        let checker = FlakyThenHealthy { calls: AtomicUsize::new(0), healthy_from: 100 };
        let healthy = poll_until_healthy(&checker, "http://svc/health", None, 5, Duration::from_millis(1)).await.unwrap();
        assert!(!healthy);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 5);
    }
}
