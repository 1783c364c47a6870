use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock and monotonic time so every component can
/// be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock {
    start: Option<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Arc<dyn Clock> {
        Arc::new(Self { start: Some(std::time::Instant::now()) })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.start.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// Test clock that only advances when told to. Used by every crate's unit
/// tests that assert ordering (`startedAt >= requestedAt`) without sleeping.
pub struct FakeClock {
    inner: Mutex<(DateTime<Utc>, Duration)>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new((start, Duration::ZERO)) })
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap();
        guard.0 += by;
        guard.1 += by.to_std().unwrap_or(Duration::ZERO);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().0
    }

    fn monotonic(&self) -> Duration {
        self.inner.lock().unwrap().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(Utc::now());
        let before = clock.now();
        clock.advance(chrono::Duration::seconds(30));
        let after = clock.now();
        assert_eq!((after - before).num_seconds(), 30);
    }
}
