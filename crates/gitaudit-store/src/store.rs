use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitaudit_core::GitopsResult;
use uuid::Uuid;

use crate::types::*;

/// Explicit store interface, one method per query, rather than
/// class-based repositories with inline SQL strings scattered through
/// call sites. SQL for the Postgres implementation lives only in
/// `postgres.rs`; tests substitute `memory::InMemoryStore`.
#[async_trait]
pub trait Store: Send + Sync {
    // -- deployments --------------------------------------------------
    async fn insert_deployment(&self, deployment: Deployment) -> GitopsResult<()>;
    /// Atomically claims the highest-priority, earliest-requested `queued`
    /// deployment for a `(repository, branch)` that has no other row
    /// `in-progress`, stamping `started_at` and `worker_id` in the same
    /// step. Returns `None` if nothing is claimable. This is the single
    /// compare-and-swap the worker pool relies on to avoid double-claiming a row.
    async fn claim_next_queued(&self, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>>;
    /// Same CAS as `claim_next_queued` but for one named row — the
    /// The Orchestration Planner drives a specific action's deployment
    /// rather than whatever the worker pool would pick next. Returns
    /// `None` if the row is missing or not `queued`.
    async fn claim_deployment(&self, id: Uuid, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>>;
    async fn get_deployment(&self, id: Uuid) -> GitopsResult<Option<Deployment>>;
    async fn list_deployments(&self, filter: DeploymentFilter) -> GitopsResult<Vec<Deployment>>;
    /// Transitions `deployment.state`; fails with `Conflict` if the row is
    /// already in a terminal state (terminal rows are write-once except
    /// for the `rollback_id` annotation).
    async fn update_deployment_state(&self, id: Uuid, mutate: DeploymentStateUpdate) -> GitopsResult<Deployment>;
    async fn has_in_progress(&self, repository: &str, branch: &str) -> GitopsResult<bool>;

    // -- deployment logs / files ---------------------------------------
    async fn append_log(&self, log: DeploymentLog) -> GitopsResult<()>;
    async fn list_logs(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentLog>>;
    async fn upsert_file(&self, file: DeploymentFile) -> GitopsResult<()>;
    async fn list_files(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentFile>>;

    // -- pipeline runs ---------------------------------------------------
    async fn insert_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()>;
    /// Rejects an update whose status rank regresses relative to the
    /// stored row.
    async fn update_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()>;
    async fn get_pipeline_run(&self, repository: &str, run_id: &str) -> GitopsResult<Option<PipelineRun>>;
    async fn list_pipeline_runs(&self, repository: &str, limit: i64) -> GitopsResult<Vec<PipelineRun>>;

    // -- templates / compliance -----------------------------------------
    async fn upsert_template(&self, template: Template) -> GitopsResult<()>;
    async fn get_template(&self, name: &str) -> GitopsResult<Option<Template>>;
    async fn list_templates(&self) -> GitopsResult<Vec<Template>>;
    async fn upsert_repository_compliance(&self, compliance: RepositoryCompliance) -> GitopsResult<()>;
    async fn get_repository_compliance(&self, repository: &str) -> GitopsResult<Option<RepositoryCompliance>>;
    async fn list_repository_compliance(&self, min_score: Option<u32>) -> GitopsResult<Vec<RepositoryCompliance>>;

    // -- metrics -----------------------------------------------------------
    async fn insert_metric_point(&self, point: MetricPoint) -> GitopsResult<()>;
    async fn query_metric_points(
        &self,
        kind: &str,
        entity: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GitopsResult<Vec<MetricPoint>>;
    async fn upsert_aggregated_metric(&self, metric: AggregatedMetric) -> GitopsResult<()>;
    async fn get_aggregated_metric(
        &self,
        kind: &str,
        entity: &str,
        interval: Interval,
        bucket_start: DateTime<Utc>,
    ) -> GitopsResult<Option<AggregatedMetric>>;

    // -- orchestration ----------------------------------------------------
    async fn upsert_profile(&self, profile: OrchestrationProfile) -> GitopsResult<()>;
    async fn get_profile(&self, name: &str) -> GitopsResult<Option<OrchestrationProfile>>;
    async fn insert_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()>;
    async fn update_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()>;
    async fn get_orchestration_run(&self, id: Uuid) -> GitopsResult<Option<OrchestrationRun>>;

    // -- auth --------------------------------------------------------------
    async fn insert_user(&self, user: User) -> GitopsResult<()>;
    async fn get_user_by_username(&self, username: &str) -> GitopsResult<Option<User>>;
    async fn get_user(&self, id: Uuid) -> GitopsResult<Option<User>>;
    async fn update_user(&self, user: User) -> GitopsResult<()>;
    async fn insert_api_key(&self, key: ApiKey) -> GitopsResult<()>;
    async fn get_api_key_by_prefix(&self, prefix: &str) -> GitopsResult<Option<ApiKey>>;
    async fn update_api_key_last_used(&self, id: Uuid, at: DateTime<Utc>) -> GitopsResult<()>;
    async fn insert_session(&self, session: Session) -> GitopsResult<()>;
    async fn get_session(&self, token_hash: &str) -> GitopsResult<Option<Session>>;
    async fn list_active_sessions_for_user(&self, user_id: Uuid) -> GitopsResult<Vec<Session>>;
    async fn update_session(&self, session: Session) -> GitopsResult<()>;
    async fn delete_session(&self, id: Uuid) -> GitopsResult<()>;
    /// Used by the session-cleanup timer-wheel task (default every hour).
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> GitopsResult<u64>;

    // -- webhook dedup -------------------------------------------------------
    /// Records a delivery id if not already present; returns `true` when
    /// this call recorded it (i.e. this is the first time we've seen it),
    /// `false` when it was already present (duplicate).
    async fn record_webhook_delivery(&self, host: &str, delivery_id: &str, ttl_seconds: u64, now: DateTime<Utc>) -> GitopsResult<bool>;

    // -- audit ----------------------------------------------------------------
    async fn append_audit_entry(&self, entry: AuditLogEntry) -> GitopsResult<()>;
    async fn list_audit_entries(&self, entity: &str, entity_id: &str) -> GitopsResult<Vec<AuditLogEntry>>;

    // -- retention / health -----------------------------------------------------
    async fn cleanup(&self, older_than_days: i64, now: DateTime<Utc>) -> GitopsResult<CleanupCounts>;
    async fn health_check(&self) -> GitopsResult<StoreHealth>;
}

/// Narrow update applied by `update_deployment_state`; keeps callers from
/// having to read-modify-write a whole `Deployment` for a transition.
#[derive(Debug, Clone, Default)]
pub struct DeploymentStateUpdate {
    pub state: DeploymentState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub backup_ref: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: Option<i32>,
}
