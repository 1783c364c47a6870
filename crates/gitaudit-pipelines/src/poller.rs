//! Polling discipline: exponential backoff starting at
//! 5s, doubling to a cap of 60s, reset on state change. `rateLimited`
//! sleeps for the host's `retryAfter` plus up to 1s of jitter instead of
//! following the backoff schedule.

use std::time::Duration;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: INITIAL_BACKOFF }
    }

    /// Call after a poll that did NOT change run state; returns the delay
    /// to wait before the next poll and doubles for next time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    /// Call after a poll that changed run state.
    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rate_limited_delay(retry_after: Duration, jitter: Duration) -> Duration {
    retry_after + jitter.min(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap_then_holds() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(40));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn reset_returns_to_the_initial_delay() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn rate_limited_jitter_is_capped_at_one_second() {
        let delay = rate_limited_delay(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(delay, Duration::from_secs(31));
    }
}
