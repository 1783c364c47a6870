use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;

type Job = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct ScheduledJob {
    name: &'static str,
    period: Duration,
    job: Job,
}

/// A single in-process timer wheel that owns every periodic background task
/// (session cleanup, metrics rollup, backup pruning, webhook dedup
/// eviction) as one testable in-process driver, instead of scattering them
/// across host-scheduler cron entries.
#[derive(Default)]
pub struct TimerWheel {
    jobs: Vec<ScheduledJob>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a periodic job. `period` is the tick interval; the handler
    /// runs to completion before the next tick for that job is scheduled.
    pub fn register<F, Fut>(&mut self, name: &'static str, period: Duration, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(ScheduledJob { name, period, job: Box::new(move || Box::pin(handler())) });
    }

    /// Spawns one tokio task per registered job and returns their handles so
    /// the caller can join them during graceful shutdown.
    pub fn spawn_all(self) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|job| {
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(job.period);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        interval.tick().await;
                        tracing::debug!(job = job.name, "timer wheel tick");
                        (job.job)().await;
                    }
                })
            })
            .collect()
    }
}
