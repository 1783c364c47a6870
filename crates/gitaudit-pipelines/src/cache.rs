//! Cache-through pipeline summary cache: LRU, default 1,000 entries,
//! TTL 60s, keyed by `(repo, runId)`.

use std::time::Duration;

use gitaudit_store::PipelineRun;
use moka::future::Cache;

pub const DEFAULT_CAPACITY: u64 = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

pub struct RunCache {
    inner: Cache<(String, String), PipelineRun>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: u64, ttl: Duration) -> Self {
        Self { inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build() }
    }

    pub async fn get(&self, repo: &str, run_id: &str) -> Option<PipelineRun> {
        self.inner.get(&(repo.to_string(), run_id.to_string())).await
    }

    pub async fn put(&self, run: PipelineRun) {
        self.inner.insert((run.repository.clone(), run.run_id.clone()), run).await;
    }

    pub async fn invalidate(&self, repo: &str, run_id: &str) {
        self.inner.invalidate(&(repo.to_string(), run_id.to_string())).await;
    }
}

impl Default for RunCache {
    fn default() -> Self {
        Self::new()
    }
}
