//! Deployment Engine: the 6-state machine and
//! 8-step protocol that drives a deployment from submission to a
//! terminal state. The worker pool is a fixed number of tasks pulling
//! claims off the store in a loop, narrowed from a larger
//! real-infrastructure pipeline down to a `queued → in-progress →
//! {completed, failed, rolled-back,
//! cancelled}` model, with RepoHost/RemoteFS standing in for the
//! Terraform/Cloudflare provisioners it used.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitaudit_capabilities::{CircuitBreaker, RemoteFS, RepoHost};
use gitaudit_core::{DomainEvent, EventPublisher, GitopsError, GitopsResult};
use gitaudit_store::{
    Deployment, DeploymentFile, DeploymentLog, DeploymentState, DeploymentStateUpdate, FileStatus, LogChannel,
    LogLevel, Store,
};
use serde_json::json;
use uuid::Uuid;

use crate::backup;
use crate::cancel::{is_cancelled, CancelRegistry};
use crate::health::{self, HealthChecker};
use crate::types::{self, DeploymentPlan};
use crate::validate::{self, ValidationConfig};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_MAX_RETRIES: i32 = 3;

pub fn room_for(repository: &str) -> String {
    format!("repo:{repository}")
}

fn split_repository(repository: &str) -> (String, String) {
    match repository.split_once('/') {
        Some((owner, name)) => (owner.to_string(), name.to_string()),
        None => (repository.to_string(), repository.to_string()),
    }
}

pub struct DeploymentEngine {
    store: Arc<dyn Store>,
    repo_host: Arc<dyn RepoHost>,
    remote_fs: Arc<dyn RemoteFS>,
    health_checker: Arc<dyn HealthChecker>,
    events: Arc<dyn EventPublisher>,
    retry_breaker: Arc<CircuitBreaker>,
    cancels: Arc<CancelRegistry>,
    validation: ValidationConfig,
    worker_id_prefix: String,
    health_max_attempts: u32,
    health_poll_interval: Duration,
}

impl DeploymentEngine {
    pub fn new(
        store: Arc<dyn Store>,
        repo_host: Arc<dyn RepoHost>,
        remote_fs: Arc<dyn RemoteFS>,
        health_checker: Arc<dyn HealthChecker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            repo_host,
            remote_fs,
            health_checker,
            events,
            retry_breaker: Arc::new(CircuitBreaker::new(Default::default())),
            cancels: Arc::new(CancelRegistry::new()),
            validation: ValidationConfig::default(),
            worker_id_prefix: "worker".to_string(),
            health_max_attempts: health::DEFAULT_MAX_ATTEMPTS,
            health_poll_interval: health::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the bounded-retry schedule used by Verify; production
    /// wiring leaves the default (30 attempts, 10s apart), tests shrink
    /// both so a rollback scenario doesn't take five minutes.
    pub fn with_health_policy(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.health_max_attempts = max_attempts;
        self.health_poll_interval = interval;
        self
    }

    pub fn cancel_registry(&self) -> Arc<CancelRegistry> {
        self.cancels.clone()
    }

    /// Admits a new deployment request: inserts a `queued` row. Priority
    /// and FIFO claim order are enforced by `Store::claim_next_queued`.
    pub async fn submit(
        &self,
        repository: &str,
        branch: &str,
        commit: &str,
        priority: gitaudit_store::Priority,
        requested_by: &str,
        parameters: serde_json::Value,
    ) -> GitopsResult<Uuid> {
        let id = Uuid::new_v4();
        let deployment = Deployment {
            id,
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit: commit.to_string(),
            state: DeploymentState::Queued,
            priority,
            requested_by: requested_by.to_string(),
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            backup_ref: None,
            error_message: None,
            original_deployment_id: None,
            parameters,
            correlation_id: None,
            worker_id: None,
        };
        self.store.insert_deployment(deployment).await?;
        Ok(id)
    }

    /// `queued → cancelled` directly; idempotent (cancelling an
    /// already-terminal row is a no-op, not an error).
    pub async fn cancel(&self, id: Uuid) -> GitopsResult<()> {
        let Some(deployment) = self.store.get_deployment(id).await? else {
            return Err(GitopsError::not_found(format!("deployment {id} not found")));
        };
        match deployment.state {
            DeploymentState::Queued => {
                self.store
                    .update_deployment_state(
                        id,
                        DeploymentStateUpdate {
                            state: DeploymentState::Cancelled,
                            started_at: None,
                            completed_at: Some(Utc::now()),
                            backup_ref: None,
                            error_message: None,
                            retry_count: None,
                        },
                    )
                    .await?;
                Ok(())
            }
            DeploymentState::InProgress => {
                self.cancels.request(id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// One iteration of a worker: claim the next eligible row and drive it
    /// to a terminal state. Returns `false` if nothing was claimable.
    pub async fn run_once(&self, worker_id: &str) -> GitopsResult<bool> {
        let Some(deployment) = self.store.claim_next_queued(worker_id, Utc::now()).await? else {
            return Ok(false);
        };

        let deployment_id = deployment.id;
        let flag = self.cancels.register(deployment_id);
        self.process(deployment, flag).await;
        self.cancels.forget(deployment_id);
        Ok(true)
    }

    /// Drives one named `queued` row to completion out of FIFO order — the
    /// The Orchestration Planner calls this per DAG action rather than
    /// letting the pool's `run_once` claim whatever is next.
    pub async fn run_specific(&self, id: Uuid, worker_id: &str) -> GitopsResult<Deployment> {
        if let Some(deployment) = self.store.claim_deployment(id, worker_id, Utc::now()).await? {
            let flag = self.cancels.register(deployment.id);
            self.process(deployment, flag).await;
            self.cancels.forget(id);
        }
        self.store.get_deployment(id).await?.ok_or_else(|| GitopsError::not_found(format!("deployment {id} not found")))
    }

    /// Rewinds an already-`completed` deployment from its recorded backup
    /// checkpoint. Terminal rows are write-once, so this never mutates the
    /// completed row in place — it restores the files, then inserts a new
    /// `rolled-back` row annotated with `originalDeploymentId`. This is
    /// the hook a failed `rollbackOnFailure` stage uses to rewind sibling
    /// completed actions in reverse order.
    pub async fn rollback_deployment(&self, original_id: Uuid, reason: &str) -> GitopsResult<Deployment> {
        let original = self
            .store
            .get_deployment(original_id)
            .await?
            .ok_or_else(|| GitopsError::not_found(format!("deployment {original_id} not found")))?;

        if original.state != DeploymentState::Completed {
            return Err(GitopsError::conflict(format!("deployment {original_id} is not completed, cannot roll back")));
        }
        let backup_ref = original
            .backup_ref
            .clone()
            .ok_or_else(|| GitopsError::internal(format!("deployment {original_id} has no recorded backup checkpoint")))?;

        let plan = types::plan_from(&original.repository, "", &original.parameters);
        backup::restore(self.remote_fs.as_ref(), &plan.destination_share, &plan.destination_dir, &backup_ref).await?;

        let now = Utc::now();
        let rollback_row = Deployment {
            id: Uuid::new_v4(),
            repository: original.repository.clone(),
            branch: original.branch.clone(),
            commit: original.commit.clone(),
            state: DeploymentState::RolledBack,
            priority: original.priority,
            requested_by: "orchestrator".to_string(),
            requested_at: now,
            started_at: Some(now),
            completed_at: Some(now),
            retry_count: 0,
            max_retries: original.max_retries,
            backup_ref: Some(backup_ref.clone()),
            error_message: Some(reason.to_string()),
            original_deployment_id: Some(original_id),
            parameters: original.parameters.clone(),
            correlation_id: None,
            worker_id: None,
        };
        self.store.insert_deployment(rollback_row.clone()).await?;
        self.emit(
            &original.repository,
            "rolled-back",
            json!({"deploymentId": rollback_row.id, "originalDeploymentId": original_id, "reason": reason}),
        );
        Ok(rollback_row)
    }

    /// Spawns `pool_size` tasks that each loop `run_once` with a short
    /// idle sleep when the queue is empty.
    pub fn spawn_pool(self: Arc<Self>, pool_size: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..pool_size.max(1))
            .map(|i| {
                let engine = self.clone();
                let worker_id = format!("{}-{i}", engine.worker_id_prefix);
                tokio::spawn(async move {
                    loop {
                        match engine.run_once(&worker_id).await {
                            Ok(true) => {}
                            Ok(false) => tokio::time::sleep(Duration::from_millis(250)).await,
                            Err(error) => {
                                tracing::error!(%error, "deployment worker iteration failed");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    async fn log(&self, deployment_id: Uuid, level: LogLevel, message: impl Into<String>) {
        let _ = self
            .store
            .append_log(DeploymentLog {
                id: Uuid::new_v4(),
                deployment_id,
                level,
                channel: LogChannel::System,
                message: message.into(),
                timestamp: Utc::now(),
                metadata: json!({}),
            })
            .await;
    }

    fn emit(&self, repository: &str, kind: &str, payload: serde_json::Value) {
        self.events.publish(DomainEvent::new(room_for(repository), format!("deployment:{kind}"), payload));
    }

    async fn finish(
        &self,
        deployment: &Deployment,
        state: DeploymentState,
        backup_ref: Option<String>,
        error_message: Option<String>,
    ) -> GitopsResult<Deployment> {
        let updated = self
            .store
            .update_deployment_state(
                deployment.id,
                DeploymentStateUpdate {
                    state,
                    started_at: None,
                    completed_at: Some(Utc::now()),
                    backup_ref,
                    error_message,
                    retry_count: None,
                },
            )
            .await?;
        Ok(updated)
    }

    /// Runs the full protocol (steps 2–8) for a freshly claimed row.
    async fn process(&self, deployment: Deployment, cancel_flag: Arc<AtomicBool>) {
        let id = deployment.id;
        let repository = deployment.repository.clone();

        if is_cancelled(&cancel_flag) {
            let _ = self.finish(&deployment, DeploymentState::Cancelled, None, None).await;
            self.emit(&repository, "cancelled", json!({"deploymentId": id}));
            return;
        }

        let resolved = match self.resolve_source(&deployment).await {
            Ok(resolved) => resolved,
            Err(error) => {
                self.log(id, LogLevel::Error, format!("resolve source failed: {error}")).await;
                let _ = self.finish(&deployment, DeploymentState::Failed, None, Some(error.message.clone())).await;
                self.emit(&repository, "failed", json!({"deploymentId": id, "step": "resolve", "error": error.kind}));
                return;
            }
        };

        if is_cancelled(&cancel_flag) {
            let _ = self.finish(&deployment, DeploymentState::Cancelled, None, None).await;
            self.emit(&repository, "cancelled", json!({"deploymentId": id}));
            return;
        }

        let plan = types::plan_from(&repository, &resolved.configuration_yaml, &deployment.parameters);

        let backup_ref = backup::backup_ref(&plan.destination_dir, id, Utc::now());
        let snapshot_result = self
            .retry(|| {
                let remote_fs = self.remote_fs.clone();
                let share = plan.destination_share.clone();
                let dir = plan.destination_dir.clone();
                let backup_ref = backup_ref.clone();
                let files = plan.files.clone();
                async move { backup::snapshot(remote_fs.as_ref(), &share, &dir, &backup_ref, &files).await }
            })
            .await;
        if let Err(error) = snapshot_result {
            self.log(id, LogLevel::Error, format!("backup failed: {error}")).await;
            let _ = self.finish(&deployment, DeploymentState::Failed, None, Some(error.message.clone())).await;
            self.emit(&repository, "backup-failed", json!({"deploymentId": id}));
            return;
        }
        self.emit(&repository, "backup:ok", json!({"deploymentId": id, "backupRef": backup_ref.clone()}));

        if let Err(error) = validate::validate_change_set(&plan.files, &plan.platform, &self.validation) {
            self.log(id, LogLevel::Error, format!("validation failed: {error}")).await;
            let _ = self.finish(&deployment, DeploymentState::Failed, Some(backup_ref), Some(error.message.clone())).await;
            self.emit(&repository, "validation-failed", json!({"deploymentId": id}));
            return;
        }

        if is_cancelled(&cancel_flag) {
            let _ = self.finish(&deployment, DeploymentState::Cancelled, Some(backup_ref), None).await;
            self.emit(&repository, "cancelled", json!({"deploymentId": id}));
            return;
        }

        if let Err(error) = self.apply(&deployment, &plan).await {
            self.log(id, LogLevel::Error, format!("apply failed: {error}")).await;
            self.emit(&repository, "apply:failed", json!({"deploymentId": id}));
            self.rollback(&deployment, &backup_ref, &plan, "apply failed", DeploymentState::RolledBack).await;
            return;
        }
        self.emit(&repository, "apply:ok", json!({"deploymentId": id}));

        let healthy = match self.verify(&plan).await {
            Ok(healthy) => healthy,
            Err(error) => {
                self.log(id, LogLevel::Error, format!("verify errored: {error}")).await;
                false
            }
        };

        if !healthy {
            self.emit(&repository, "verify:failed", json!({"deploymentId": id}));
            self.rollback(&deployment, &backup_ref, &plan, "health check failed", DeploymentState::RolledBack).await;
            return;
        }
        self.emit(&repository, "verify:ok", json!({"deploymentId": id}));

        if is_cancelled(&cancel_flag) {
            self.rollback(&deployment, &backup_ref, &plan, "cancelled after apply", DeploymentState::Cancelled).await;
            return;
        }

        let completed = self.finish(&deployment, DeploymentState::Completed, Some(backup_ref), None).await;
        if let Ok(completed) = completed {
            self.emit(
                &repository,
                "completed",
                json!({"deploymentId": id, "startedAt": completed.started_at, "completedAt": completed.completed_at}),
            );
        }
    }

    /// Step 2: fetches the target commit's `configuration.yaml` and
    /// confirms the commit is a descendant of the requested branch. No
    /// true ancestry walk is available over `RepoHost`'s surface, so this
    /// checks commit membership in the branch's own history, retried
    /// under the transport/rateLimited/timeout rule (steps 2-4 retry).
    async fn resolve_source(&self, deployment: &Deployment) -> GitopsResult<ResolvedSource> {
        let (owner, repo) = split_repository(&deployment.repository);

        let commits = self.retry(|| {
            let repo_host = self.repo_host.clone();
            let owner = owner.clone();
            let repo = repo.clone();
            let branch = deployment.branch.clone();
            async move { repo_host.list_commits(&owner, &repo, &branch).await }
        })
        .await?;

        let commit = if deployment.commit.is_empty() {
            commits.first().map(|c| c.sha.clone()).ok_or_else(|| GitopsError::not_found("branch has no commits"))?
        } else {
            if !commits.iter().any(|c| c.sha == deployment.commit) {
                return Err(GitopsError::policy_violation(format!(
                    "commit {} is not a descendant of {}",
                    deployment.commit, deployment.branch
                )));
            }
            deployment.commit.clone()
        };

        let file = self
            .retry(|| {
                let repo_host = self.repo_host.clone();
                let owner = owner.clone();
                let repo = repo.clone();
                let commit = commit.clone();
                async move { repo_host.get_file(&owner, &repo, "configuration.yaml", Some(&commit)).await }
            })
            .await
            .map(|f| f.content)
            .unwrap_or_default();

        Ok(ResolvedSource { configuration_yaml: file })
    }

    /// Step 5: applies each file in the plan's change set via `RemoteFS`,
    /// recording a `DeploymentFile` row per file (pending → ok/error).
    async fn apply(&self, deployment: &Deployment, plan: &DeploymentPlan) -> GitopsResult<()> {
        for spec in types::apply_order(&plan.files) {
            let mut row = DeploymentFile {
                id: Uuid::new_v4(),
                deployment_id: deployment.id,
                path: spec.path.clone(),
                op: spec.op,
                size: spec.content.as_ref().map(|c| c.len() as i64).unwrap_or(0),
                hash: None,
                backup_path: None,
                status: FileStatus::Pending,
                error_message: None,
            };
            self.store.upsert_file(row.clone()).await?;

            let dest_path = if plan.destination_dir.is_empty() { spec.path.clone() } else { format!("{}/{}", plan.destination_dir, spec.path) };

            let result = match spec.op {
                gitaudit_store::FileOp::Delete => self.remote_fs.delete(&plan.destination_share, &dest_path).await,
                _ => {
                    let bytes = spec.content.clone().unwrap_or_default().into_bytes();
                    row.hash = Some(gitaudit_core::Fingerprint::of(&bytes).to_hex());
                    self.remote_fs.write_file(&plan.destination_share, &dest_path, &bytes).await
                }
            };

            match result {
                Ok(()) => row.status = FileStatus::Ok,
                Err(error) => {
                    row.status = FileStatus::Error;
                    row.error_message = Some(error.message.clone());
                    self.store.upsert_file(row).await?;
                    return Err(error);
                }
            }
            self.store.upsert_file(row).await?;
        }
        Ok(())
    }

    /// Step 6: bounded-retry poll of the downstream health endpoint.
    async fn verify(&self, plan: &DeploymentPlan) -> GitopsResult<bool> {
        let Some(url) = &plan.health_check_url else {
            return Ok(true);
        };
        health::poll_until_healthy(
            self.health_checker.as_ref(),
            url,
            plan.health_check_body_contains.as_deref(),
            self.health_max_attempts,
            self.health_poll_interval,
        )
        .await
    }

    /// Step 7: restores the backup, retried up to `maxRetries` times; a
    /// rollback that never succeeds ends in `failed` with `rollbackFailed`.
    /// `target_state` is the terminal state to write once the restore
    /// succeeds — `RolledBack` for a failure-triggered rollback, or
    /// `Cancelled` when the restore is only here because cancellation
    /// landed after apply and the engine must undo it before stopping.
    async fn rollback(
        &self,
        deployment: &Deployment,
        backup_ref: &str,
        plan: &DeploymentPlan,
        reason: &str,
        target_state: DeploymentState,
    ) {
        let id = deployment.id;
        let event_name = match target_state {
            DeploymentState::Cancelled => "cancelled",
            _ => "rolled-back",
        };
        let mut attempts = 0;
        loop {
            attempts += 1;
            match backup::restore(self.remote_fs.as_ref(), &plan.destination_share, &plan.destination_dir, backup_ref).await {
                Ok(()) => {
                    self.log(id, LogLevel::Info, format!("rolled back: {reason}")).await;
                    let _ = self.finish(deployment, target_state, Some(backup_ref.to_string()), Some(reason.to_string())).await;
                    self.emit(&deployment.repository, event_name, json!({"deploymentId": id, "reason": reason}));
                    return;
                }
                Err(error) if attempts <= deployment.max_retries => {
                    self.log(id, LogLevel::Warn, format!("rollback attempt {attempts} failed: {error}")).await;
                }
                Err(error) => {
                    let tagged = GitopsError::rollback_failed(format!("{reason}; rollback also failed: {error}"));
                    let _ = self.finish(deployment, DeploymentState::Failed, Some(backup_ref.to_string()), Some(tagged.message.clone())).await;
                    self.emit(&deployment.repository, "failed", json!({"deploymentId": id, "kind": "rollbackFailed"}));
                    return;
                }
            }
        }
    }

    /// Retries a step-2-through-4 operation (resolve, backup, validate) on
    /// `transport`/`rateLimited`/`timeout` errors, wrapped in the shared
    /// circuit breaker so a degraded `RepoHost`/`RemoteFS` doesn't starve
    /// the worker pool.
    async fn retry<F, Fut, T>(&self, mut operation: F) -> GitopsResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = GitopsResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.retry_breaker.call(&mut operation).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt <= DEFAULT_MAX_RETRIES as u32 && error.kind.is_retryable() => continue,
                Err(error) => return Err(error),
            }
        }
    }
}

struct ResolvedSource {
    configuration_yaml: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitaudit_capabilities::{Branch, Commit, FileContent, PullRequest};
    use gitaudit_store::{InMemoryStore, Priority};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeRepoHost {
        commits: Vec<Commit>,
        configuration_yaml: String,
    }

    #[async_trait::async_trait]
    impl RepoHost for FakeRepoHost {
        async fn get_file(&self, _owner: &str, _repo: &str, _path: &str, _git_ref: Option<&str>) -> GitopsResult<FileContent> {
            Ok(FileContent { content: self.configuration_yaml.clone(), sha: "sha".to_string() })
        }
        async fn put_file(
            &self,
            _owner: &str,
            _repo: &str,
            _path: &str,
            _content: &[u8],
            _message: &str,
            _branch: &str,
            _sha: Option<&str>,
        ) -> GitopsResult<gitaudit_capabilities::CommitRef> {
            unimplemented!()
        }
        async fn list_branches(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<Branch>> {
            Ok(vec![])
        }
        async fn list_commits(&self, _owner: &str, _repo: &str, _branch: &str) -> GitopsResult<Vec<Commit>> {
            Ok(self.commits.clone())
        }
        async fn create_branch(&self, _owner: &str, _repo: &str, _name: &str, _from_sha: &str) -> GitopsResult<Branch> {
            unimplemented!()
        }
        async fn list_tags(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<String>> {
            Ok(vec![])
        }
        async fn create_pull_request(
            &self,
            _owner: &str,
            _repo: &str,
            _title: &str,
            _head: &str,
            _base: &str,
        ) -> GitopsResult<PullRequest> {
            unimplemented!()
        }
        async fn list_pull_requests(&self, _owner: &str, _repo: &str, _state: &str) -> GitopsResult<Vec<PullRequest>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeRemoteFS {
        files: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl RemoteFS for FakeRemoteFS {
        async fn create_dir(&self, _share: &str, _path: &str) -> GitopsResult<()> {
            Ok(())
        }
        async fn write_file(&self, share: &str, path: &str, bytes: &[u8]) -> GitopsResult<()> {
            self.files.lock().unwrap().insert((share.to_string(), path.to_string()), bytes.to_vec());
            Ok(())
        }
        async fn read_file(&self, share: &str, path: &str) -> GitopsResult<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(&(share.to_string(), path.to_string()))
                .cloned()
                .ok_or_else(|| GitopsError::not_found(format!("{share}/{path} not found")))
        }
        async fn list(&self, _share: &str, _path: &str) -> GitopsResult<Vec<gitaudit_capabilities::FileInfo>> {
            Ok(vec![])
        }
        async fn delete(&self, share: &str, path: &str) -> GitopsResult<()> {
            self.files.lock().unwrap().remove(&(share.to_string(), path.to_string()));
            Ok(())
        }
        async fn get_info(&self, _share: &str, _path: &str) -> GitopsResult<gitaudit_capabilities::FileInfo> {
            unimplemented!()
        }
    }

    struct FakeHealthChecker {
        failures_before_healthy: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl HealthChecker for FakeHealthChecker {
        async fn check(&self, _url: &str) -> GitopsResult<health::HealthResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.failures_before_healthy {
                Ok(health::HealthResponse { status: 200, body: "ok".to_string() })
            } else {
                Ok(health::HealthResponse { status: 503, body: "unavailable".to_string() })
            }
        }
    }

    fn commit(sha: &str) -> Commit {
        Commit { sha: sha.to_string(), message: "msg".to_string(), author: "someone".to_string() }
    }

    fn engine(repo_host: FakeRepoHost, fs: FakeRemoteFS, health: FakeHealthChecker) -> (Arc<DeploymentEngine>, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let events: Arc<dyn EventPublisher> = Arc::new(gitaudit_core::NoopEventPublisher);
        let engine = Arc::new(
            DeploymentEngine::new(store.clone(), Arc::new(repo_host), Arc::new(fs), Arc::new(health), events)
                .with_health_policy(3, Duration::from_millis(1)),
        );
        (engine, store)
    }

    fn params_with_health_check() -> serde_json::Value {
        json!({"healthCheckUrl": "http://svc/health"})
    }

    #[tokio::test]
    async fn happy_path_deployment_reaches_completed() {
        let (engine, store) = engine(
            FakeRepoHost { commits: vec![commit("deadbeef")], configuration_yaml: "homeassistant:\n  name: home\n".to_string() },
            FakeRemoteFS::default(),
            FakeHealthChecker { failures_before_healthy: 0, calls: AtomicU32::new(0) },
        );

        let id = engine
            .submit("festion/home-assistant-config", "main", "deadbeef", Priority::Normal, "alice", params_with_health_check())
            .await
            .unwrap();

        engine.run_once("worker-0").await.unwrap();

        let deployment = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(deployment.state, DeploymentState::Completed);
        assert!(deployment.completed_at.unwrap() > deployment.started_at.unwrap());
        assert!(deployment.started_at.unwrap() >= deployment.requested_at);
    }

    #[tokio::test]
    async fn verify_failure_rolls_back_to_the_prior_bytes() {
        let fs = Arc::new(FakeRemoteFS::default());
        fs.files.lock().unwrap().insert(
            ("festion/home-assistant-config".to_string(), "configuration.yaml".to_string()),
            b"homeassistant:\n  name: old\n".to_vec(),
        );
        let fs_handle = fs.clone();

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let events: Arc<dyn EventPublisher> = Arc::new(gitaudit_core::NoopEventPublisher);
        let engine = Arc::new(
            DeploymentEngine::new(
                store.clone(),
                Arc::new(FakeRepoHost { commits: vec![commit("deadbeef")], configuration_yaml: "homeassistant:\n  name: new\n".to_string() }),
                fs as Arc<dyn RemoteFS>,
                Arc::new(FakeHealthChecker { failures_before_healthy: u32::MAX, calls: AtomicU32::new(0) }),
                events,
            )
            .with_health_policy(3, Duration::from_millis(1)),
        );

        let id = engine
            .submit("festion/home-assistant-config", "main", "deadbeef", Priority::Normal, "alice", params_with_health_check())
            .await
            .unwrap();

        engine.run_once("worker-0").await.unwrap();

        let deployment = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(deployment.state, DeploymentState::RolledBack);
        assert_eq!(deployment.error_message.as_deref(), Some("health check failed"));

        let restored = fs_handle.files.lock().unwrap().get(&("festion/home-assistant-config".to_string(), "configuration.yaml".to_string())).cloned();
        assert_eq!(restored, Some(b"homeassistant:\n  name: old\n".to_vec()));
    }

    #[tokio::test]
    async fn policy_violation_when_commit_is_not_on_the_branch() {
        let (engine, store) = engine(
            FakeRepoHost { commits: vec![commit("other-sha")], configuration_yaml: String::new() },
            FakeRemoteFS::default(),
            FakeHealthChecker { failures_before_healthy: 0, calls: AtomicU32::new(0) },
        );

        let id = engine
            .submit("festion/home-assistant-config", "main", "not-on-branch", Priority::Normal, "alice", json!({}))
            .await
            .unwrap();

        engine.run_once("worker-0").await.unwrap();

        let deployment = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(deployment.state, DeploymentState::Failed);
    }

    #[tokio::test]
    async fn cancel_of_a_queued_deployment_is_immediate() {
        let (engine, store) = engine(
            FakeRepoHost { commits: vec![], configuration_yaml: String::new() },
            FakeRemoteFS::default(),
            FakeHealthChecker { failures_before_healthy: 0, calls: AtomicU32::new(0) },
        );

        let id = engine.submit("r", "main", "", Priority::Normal, "alice", json!({})).await.unwrap();
        engine.cancel(id).await.unwrap();

        let deployment = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(deployment.state, DeploymentState::Cancelled);
    }

    #[tokio::test]
    async fn rollback_deployment_restores_bytes_and_annotates_a_new_row() {
        let fs = Arc::new(FakeRemoteFS::default());
        fs.files.lock().unwrap().insert(
            ("festion/home-assistant-config".to_string(), "configuration.yaml".to_string()),
            b"homeassistant:\n  name: old\n".to_vec(),
        );
        let fs_handle = fs.clone();

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let events: Arc<dyn EventPublisher> = Arc::new(gitaudit_core::NoopEventPublisher);
        let engine = Arc::new(DeploymentEngine::new(
            store.clone(),
            Arc::new(FakeRepoHost { commits: vec![commit("deadbeef")], configuration_yaml: "homeassistant:\n  name: new\n".to_string() }),
            fs as Arc<dyn RemoteFS>,
            Arc::new(FakeHealthChecker { failures_before_healthy: 0, calls: AtomicU32::new(0) }),
            events,
        ));

        let id = engine.submit("festion/home-assistant-config", "main", "deadbeef", Priority::Normal, "alice", json!({})).await.unwrap();
        engine.run_once("worker-0").await.unwrap();
        let original = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(original.state, DeploymentState::Completed);

        let rolled_back = engine.rollback_deployment(id, "orchestration rollback").await.unwrap();
        assert_eq!(rolled_back.state, DeploymentState::RolledBack);
        assert_eq!(rolled_back.original_deployment_id, Some(id));

        // the completed row itself is untouched — write-once.
        let still_completed = store.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(still_completed.state, DeploymentState::Completed);

        let restored = fs_handle.files.lock().unwrap().get(&("festion/home-assistant-config".to_string(), "configuration.yaml".to_string())).cloned();
        assert_eq!(restored, Some(b"homeassistant:\n  name: old\n".to_vec()));
    }

    #[tokio::test]
    async fn run_specific_claims_only_the_named_deployment() {
        let (engine, store) = engine(
            FakeRepoHost { commits: vec![commit("deadbeef")], configuration_yaml: "homeassistant:\n  name: home\n".to_string() },
            FakeRemoteFS::default(),
            FakeHealthChecker { failures_before_healthy: 0, calls: AtomicU32::new(0) },
        );

        let target = engine.submit("festion/a", "main", "deadbeef", Priority::Normal, "alice", json!({})).await.unwrap();
        let bystander = engine.submit("festion/b", "main", "", Priority::Urgent, "alice", json!({})).await.unwrap();

        engine.run_specific(target, "worker-0").await.unwrap();

        assert_eq!(store.get_deployment(target).await.unwrap().unwrap().state, DeploymentState::Completed);
        assert_eq!(store.get_deployment(bystander).await.unwrap().unwrap().state, DeploymentState::Queued);
    }
}
