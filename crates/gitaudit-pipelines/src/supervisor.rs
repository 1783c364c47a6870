//! Pipeline Supervisor: trigger/status/metrics over
//! code-host workflow runs, with polling, caching, and rate-limiting
//! rules.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitaudit_core::{DomainEvent, EventPublisher, GitopsError, GitopsResult, RateLimiterRegistry};
use gitaudit_metrics::percentile;
use gitaudit_store::{PipelineRun, PipelineStatus, Store};
use serde_json::json;

use crate::cache::RunCache;
use crate::code_host::CodeHost;
use crate::poller::{rate_limited_delay, Backoff};
use crate::types::PipelineMetricsSummary;

const TRIGGER_RATE_PER_MINUTE: u32 = 10;
const TRIGGER_BURST: u32 = 3;

pub fn room_for(repository: &str) -> String {
    format!("pipeline:{repository}")
}

pub struct PipelineSupervisor {
    store: Arc<dyn Store>,
    host: Arc<dyn CodeHost>,
    cache: RunCache,
    rate_limiter: RateLimiterRegistry,
    events: Arc<dyn EventPublisher>,
}

impl PipelineSupervisor {
    pub fn new(store: Arc<dyn Store>, host: Arc<dyn CodeHost>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            host,
            cache: RunCache::new(),
            rate_limiter: RateLimiterRegistry::new(TRIGGER_RATE_PER_MINUTE, TRIGGER_BURST),
            events,
        }
    }

    /// Rate-limited per principal. Inserts a `pending` run row, spawns the
    /// poll loop, and returns the run id immediately.
    pub async fn trigger(&self, principal: &str, repo: &str, workflow: &str, params: serde_json::Value) -> GitopsResult<String> {
        if !self.rate_limiter.try_acquire(principal).await {
            return Err(GitopsError::rate_limited(60));
        }

        let run_id = self.host.trigger_workflow(repo, workflow, &params).await?;
        let run = PipelineRun {
            id: uuid::Uuid::new_v4(),
            repository: repo.to_string(),
            branch: params.get("branch").and_then(|v| v.as_str()).unwrap_or("main").to_string(),
            workflow_name: workflow.to_string(),
            run_id: run_id.clone(),
            status: PipelineStatus::Pending,
            conclusion: None,
            started_at: Utc::now(),
            completed_at: None,
            commit: params.get("commit").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            actor: principal.to_string(),
            jobs: json!([]),
            steps: json!([]),
        };
        self.store.insert_pipeline_run(run.clone()).await?;
        self.cache.put(run.clone()).await;

        Ok(run_id)
    }

    /// Cache-through read of the latest known snapshot.
    pub async fn status(&self, repo: &str, run_id: &str) -> GitopsResult<Option<PipelineRun>> {
        if let Some(cached) = self.cache.get(repo, run_id).await {
            return Ok(Some(cached));
        }
        let run = self.store.get_pipeline_run(repo, run_id).await?;
        if let Some(run) = &run {
            self.cache.put(run.clone()).await;
        }
        Ok(run)
    }

    /// Runs a run to a terminal state: polls with exponential backoff,
    /// resetting on any observed state change, honoring `retryAfter` on
    /// `rateLimited` responses instead of the normal schedule.
    pub async fn poll_until_terminal(&self, repo: &str, run_id: &str) -> GitopsResult<PipelineRun> {
        let mut backoff = Backoff::new();
        let mut last_status = PipelineStatus::Pending;

        loop {
            match self.host.get_run_status(repo, run_id).await {
                Ok(observed) => {
                    let status = parse_status(&observed.status);
                    let changed = status != last_status;

                    if changed {
                        let mut run = self.store.get_pipeline_run(repo, run_id).await?.ok_or_else(|| {
                            GitopsError::not_found(format!("pipeline run {run_id} for {repo} not found"))
                        })?;
                        run.status = status;
                        run.conclusion = observed.conclusion.clone();
                        run.completed_at = observed.completed_at.or_else(|| status.is_terminal().then(Utc::now));
                        self.store.update_pipeline_run(run.clone()).await?;
                        self.cache.put(run.clone()).await;
                        self.events.publish(DomainEvent::new(
                            room_for(repo),
                            format!("pipeline:{status:?}").to_lowercase(),
                            json!({"repo": repo, "runId": run_id, "status": observed.status}),
                        ));
                        last_status = status;
                        backoff.reset();

                        if status.is_terminal() {
                            if let Some(duration) = run.duration_seconds() {
                                self.rollup_duration(repo, status, duration as f64).await?;
                            }
                            return Ok(run);
                        }
                    }

                    tokio::time::sleep(backoff.next_delay()).await;
                }
                Err(error) if error.kind == gitaudit_core::ErrorKind::RateLimited => {
                    let retry_after = observed_retry_after(&error);
                    tokio::time::sleep(rate_limited_delay(retry_after, jitter())).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn rollup_duration(&self, repo: &str, status: PipelineStatus, duration_seconds: f64) -> GitopsResult<()> {
        self.events.publish(DomainEvent::new(
            room_for(repo),
            "pipeline:duration".to_string(),
            json!({"repo": repo, "status": format!("{status:?}"), "durationSeconds": duration_seconds}),
        ));
        Ok(())
    }

    /// Sourced from historical runs in the window; `avgDuration`/
    /// `medianDuration` reuses the Metrics Aggregator's percentile interpolation.
    pub async fn metrics(&self, repo: &str, window_start: chrono::DateTime<Utc>) -> GitopsResult<PipelineMetricsSummary> {
        let runs = self.store.list_pipeline_runs(repo, 10_000).await?;
        let runs: Vec<_> = runs.into_iter().filter(|run| run.started_at >= window_start).collect();

        let total = runs.len() as u64;
        let successful = runs.iter().filter(|r| r.status == PipelineStatus::Success).count() as u64;
        let failed = runs.iter().filter(|r| r.status == PipelineStatus::Failure).count() as u64;
        let cancelled = runs.iter().filter(|r| r.status == PipelineStatus::Cancelled).count() as u64;

        let mut durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_seconds()).map(|d| d as f64).collect();
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let avg_duration = if durations.is_empty() { 0.0 } else { durations.iter().sum::<f64>() / durations.len() as f64 };

        Ok(PipelineMetricsSummary {
            total,
            successful,
            failed,
            cancelled,
            success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            failure_rate: if total == 0 { 0.0 } else { failed as f64 / total as f64 },
            avg_duration,
            median_duration: percentile::median(&durations),
        })
    }
}

fn parse_status(raw: &str) -> PipelineStatus {
    match raw {
        "pending" | "queued" => PipelineStatus::Pending,
        "running" | "in_progress" => PipelineStatus::Running,
        "success" | "succeeded" => PipelineStatus::Success,
        "failure" | "failed" => PipelineStatus::Failure,
        "cancelled" | "canceled" => PipelineStatus::Cancelled,
        _ => PipelineStatus::Pending,
    }
}

fn observed_retry_after(error: &GitopsError) -> Duration {
    error.details.get("retryAfter").and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(Duration::from_secs(30))
}

fn jitter() -> Duration {
    Duration::from_millis((Utc::now().timestamp_subsec_millis() % 1000) as u64)
}
