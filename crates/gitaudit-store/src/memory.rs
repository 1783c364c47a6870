//! In-memory `Store` implementation. This is what `gitaudit-deploy`,
//! `gitaudit-pipelines`, and the rest substitute in unit tests instead of
//! standing up a database.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitaudit_core::{GitopsError, GitopsResult};
use uuid::Uuid;

use crate::store::{DeploymentStateUpdate, Store};
use crate::types::*;

#[derive(Default)]
struct Tables {
    deployments: HashMap<Uuid, Deployment>,
    deployment_logs: HashMap<Uuid, Vec<DeploymentLog>>,
    deployment_files: HashMap<Uuid, Vec<DeploymentFile>>,
    pipeline_runs: HashMap<(String, String), PipelineRun>,
    templates: HashMap<String, Template>,
    compliance: HashMap<String, RepositoryCompliance>,
    metric_points: Vec<MetricPoint>,
    aggregated_metrics: HashMap<(String, String, Interval, DateTime<Utc>), AggregatedMetric>,
    profiles: HashMap<String, OrchestrationProfile>,
    orchestration_runs: HashMap<Uuid, OrchestrationRun>,
    users: HashMap<Uuid, User>,
    api_keys: HashMap<String, ApiKey>,
    sessions: HashMap<String, Session>,
    webhook_deliveries: HashMap<(String, String), DateTime<Utc>>,
    audit: Vec<AuditLogEntry>,
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()) }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn priority_rank(p: Priority) -> u8 {
    match p {
        Priority::Urgent => 0,
        Priority::High => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_deployment(&self, deployment: Deployment) -> GitopsResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.deployments.insert(deployment.id, deployment);
        Ok(())
    }

    async fn claim_next_queued(&self, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>> {
        let mut tables = self.tables.write().unwrap();

        let busy_pairs: std::collections::HashSet<(String, String)> = tables
            .deployments
            .values()
            .filter(|d| d.state == DeploymentState::InProgress)
            .map(|d| (d.repository.clone(), d.branch.clone()))
            .collect();

        let mut candidates: Vec<Uuid> = tables
            .deployments
            .values()
            .filter(|d| d.state == DeploymentState::Queued)
            .filter(|d| !busy_pairs.contains(&(d.repository.clone(), d.branch.clone())))
            .map(|d| d.id)
            .collect();

        candidates.sort_by(|a, b| {
            let da = &tables.deployments[a];
            let db = &tables.deployments[b];
            priority_rank(da.priority)
                .cmp(&priority_rank(db.priority))
                .then(da.requested_at.cmp(&db.requested_at))
        });

        let Some(winner) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let deployment = tables.deployments.get_mut(&winner).unwrap();
        deployment.state = DeploymentState::InProgress;
        deployment.started_at = Some(now);
        deployment.worker_id = Some(worker_id.to_string());
        Ok(Some(deployment.clone()))
    }

    async fn claim_deployment(&self, id: Uuid, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>> {
        let mut tables = self.tables.write().unwrap();
        let Some(deployment) = tables.deployments.get_mut(&id) else {
            return Ok(None);
        };
        if deployment.state != DeploymentState::Queued {
            return Ok(None);
        }
        deployment.state = DeploymentState::InProgress;
        deployment.started_at = Some(now);
        deployment.worker_id = Some(worker_id.to_string());
        Ok(Some(deployment.clone()))
    }

    async fn get_deployment(&self, id: Uuid) -> GitopsResult<Option<Deployment>> {
        Ok(self.tables.read().unwrap().deployments.get(&id).cloned())
    }

    async fn list_deployments(&self, filter: DeploymentFilter) -> GitopsResult<Vec<Deployment>> {
        let tables = self.tables.read().unwrap();
        let mut rows: Vec<Deployment> = tables
            .deployments
            .values()
            .filter(|d| filter.status.map(|s| s == d.state).unwrap_or(true))
            .filter(|d| filter.repository.as_deref().map(|r| r == d.repository).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        let offset = filter.offset.max(0) as usize;
        let limit = if filter.limit <= 0 { rows.len() as i64 } else { filter.limit } as usize;
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_deployment_state(&self, id: Uuid, mutate: DeploymentStateUpdate) -> GitopsResult<Deployment> {
        let mut tables = self.tables.write().unwrap();
        let deployment = tables
            .deployments
            .get_mut(&id)
            .ok_or_else(|| GitopsError::not_found(format!("deployment {id} not found")))?;

        if deployment.state.is_terminal() {
            return Err(GitopsError::conflict("deployment is already in a terminal state"));
        }

        deployment.state = mutate.state;
        if let Some(started) = mutate.started_at {
            deployment.started_at = Some(started);
        }
        if let Some(completed) = mutate.completed_at {
            deployment.completed_at = Some(completed);
        }
        if mutate.backup_ref.is_some() {
            deployment.backup_ref = mutate.backup_ref;
        }
        if mutate.error_message.is_some() {
            deployment.error_message = mutate.error_message;
        }
        if let Some(retries) = mutate.retry_count {
            deployment.retry_count = retries;
        }
        Ok(deployment.clone())
    }

    async fn has_in_progress(&self, repository: &str, branch: &str) -> GitopsResult<bool> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .deployments
            .values()
            .any(|d| d.repository == repository && d.branch == branch && d.state == DeploymentState::InProgress))
    }

    async fn append_log(&self, log: DeploymentLog) -> GitopsResult<()> {
        self.tables.write().unwrap().deployment_logs.entry(log.deployment_id).or_default().push(log);
        Ok(())
    }

    async fn list_logs(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentLog>> {
        Ok(self.tables.read().unwrap().deployment_logs.get(&deployment_id).cloned().unwrap_or_default())
    }

    async fn upsert_file(&self, file: DeploymentFile) -> GitopsResult<()> {
        let mut tables = self.tables.write().unwrap();
        let files = tables.deployment_files.entry(file.deployment_id).or_default();
        if let Some(existing) = files.iter_mut().find(|f| f.id == file.id) {
            *existing = file;
        } else {
            files.push(file);
        }
        Ok(())
    }

    async fn list_files(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentFile>> {
        Ok(self.tables.read().unwrap().deployment_files.get(&deployment_id).cloned().unwrap_or_default())
    }

    async fn insert_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.pipeline_runs.insert((run.repository.clone(), run.run_id.clone()), run);
        Ok(())
    }

    async fn update_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()> {
        let mut tables = self.tables.write().unwrap();
        let key = (run.repository.clone(), run.run_id.clone());
        if let Some(existing) = tables.pipeline_runs.get(&key) {
            if run.status.rank() < existing.status.rank() {
                return Err(GitopsError::conflict("pipeline status would regress"));
            }
        }
        tables.pipeline_runs.insert(key, run);
        Ok(())
    }

    async fn get_pipeline_run(&self, repository: &str, run_id: &str) -> GitopsResult<Option<PipelineRun>> {
        Ok(self.tables.read().unwrap().pipeline_runs.get(&(repository.to_string(), run_id.to_string())).cloned())
    }

    async fn list_pipeline_runs(&self, repository: &str, limit: i64) -> GitopsResult<Vec<PipelineRun>> {
        let tables = self.tables.read().unwrap();
        let mut rows: Vec<PipelineRun> =
            tables.pipeline_runs.values().filter(|r| r.repository == repository).cloned().collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(if limit <= 0 { rows.len() } else { limit as usize });
        Ok(rows)
    }

    async fn upsert_template(&self, template: Template) -> GitopsResult<()> {
        self.tables.write().unwrap().templates.insert(template.name.clone(), template);
        Ok(())
    }

    async fn get_template(&self, name: &str) -> GitopsResult<Option<Template>> {
        Ok(self.tables.read().unwrap().templates.get(name).cloned())
    }

    async fn list_templates(&self) -> GitopsResult<Vec<Template>> {
        Ok(self.tables.read().unwrap().templates.values().cloned().collect())
    }

    async fn upsert_repository_compliance(&self, compliance: RepositoryCompliance) -> GitopsResult<()> {
        self.tables.write().unwrap().compliance.insert(compliance.repository.clone(), compliance);
        Ok(())
    }

    async fn get_repository_compliance(&self, repository: &str) -> GitopsResult<Option<RepositoryCompliance>> {
        Ok(self.tables.read().unwrap().compliance.get(repository).cloned())
    }

    async fn list_repository_compliance(&self, min_score: Option<u32>) -> GitopsResult<Vec<RepositoryCompliance>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .compliance
            .values()
            .filter(|c| min_score.map(|m| c.score >= m).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn insert_metric_point(&self, point: MetricPoint) -> GitopsResult<()> {
        self.tables.write().unwrap().metric_points.push(point);
        Ok(())
    }

    async fn query_metric_points(
        &self,
        kind: &str,
        entity: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GitopsResult<Vec<MetricPoint>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .metric_points
            .iter()
            .filter(|p| p.kind == kind && p.entity == entity && p.timestamp >= from && p.timestamp <= to)
            .cloned()
            .collect())
    }

    async fn upsert_aggregated_metric(&self, metric: AggregatedMetric) -> GitopsResult<()> {
        let key = (metric.kind.clone(), metric.entity.clone(), metric.interval, metric.bucket_start);
        self.tables.write().unwrap().aggregated_metrics.insert(key, metric);
        Ok(())
    }

    async fn get_aggregated_metric(
        &self,
        kind: &str,
        entity: &str,
        interval: Interval,
        bucket_start: DateTime<Utc>,
    ) -> GitopsResult<Option<AggregatedMetric>> {
        let key = (kind.to_string(), entity.to_string(), interval, bucket_start);
        Ok(self.tables.read().unwrap().aggregated_metrics.get(&key).cloned())
    }

    async fn upsert_profile(&self, profile: OrchestrationProfile) -> GitopsResult<()> {
        self.tables.write().unwrap().profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    async fn get_profile(&self, name: &str) -> GitopsResult<Option<OrchestrationProfile>> {
        Ok(self.tables.read().unwrap().profiles.get(name).cloned())
    }

    async fn insert_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()> {
        self.tables.write().unwrap().orchestration_runs.insert(run.id, run);
        Ok(())
    }

    async fn update_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()> {
        self.tables.write().unwrap().orchestration_runs.insert(run.id, run);
        Ok(())
    }

    async fn get_orchestration_run(&self, id: Uuid) -> GitopsResult<Option<OrchestrationRun>> {
        Ok(self.tables.read().unwrap().orchestration_runs.get(&id).cloned())
    }

    async fn insert_user(&self, user: User) -> GitopsResult<()> {
        self.tables.write().unwrap().users.insert(user.id, user);
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> GitopsResult<Option<User>> {
        Ok(self.tables.read().unwrap().users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: Uuid) -> GitopsResult<Option<User>> {
        Ok(self.tables.read().unwrap().users.get(&id).cloned())
    }

    async fn update_user(&self, user: User) -> GitopsResult<()> {
        self.tables.write().unwrap().users.insert(user.id, user);
        Ok(())
    }

    async fn insert_api_key(&self, key: ApiKey) -> GitopsResult<()> {
        self.tables.write().unwrap().api_keys.insert(key.prefix.clone(), key);
        Ok(())
    }

    async fn get_api_key_by_prefix(&self, prefix: &str) -> GitopsResult<Option<ApiKey>> {
        Ok(self.tables.read().unwrap().api_keys.get(prefix).cloned())
    }

    async fn update_api_key_last_used(&self, id: Uuid, at: DateTime<Utc>) -> GitopsResult<()> {
        let mut tables = self.tables.write().unwrap();
        if let Some(key) = tables.api_keys.values_mut().find(|k| k.id == id) {
            key.last_used = Some(at);
        }
        Ok(())
    }

    async fn insert_session(&self, session: Session) -> GitopsResult<()> {
        self.tables.write().unwrap().sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> GitopsResult<Option<Session>> {
        Ok(self.tables.read().unwrap().sessions.get(token_hash).cloned())
    }

    async fn list_active_sessions_for_user(&self, user_id: Uuid) -> GitopsResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .tables
            .read()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn update_session(&self, session: Session) -> GitopsResult<()> {
        self.tables.write().unwrap().sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> GitopsResult<()> {
        self.tables.write().unwrap().sessions.retain(|_, s| s.id != id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> GitopsResult<u64> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn record_webhook_delivery(
        &self,
        host: &str,
        delivery_id: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> GitopsResult<bool> {
        let mut tables = self.tables.write().unwrap();
        let key = (host.to_string(), delivery_id.to_string());
        if let Some(expires_at) = tables.webhook_deliveries.get(&key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        tables
            .webhook_deliveries
            .insert(key, now + chrono::Duration::seconds(ttl_seconds as i64));
        Ok(true)
    }

    async fn append_audit_entry(&self, entry: AuditLogEntry) -> GitopsResult<()> {
        self.tables.write().unwrap().audit.push(entry);
        Ok(())
    }

    async fn list_audit_entries(&self, entity: &str, entity_id: &str) -> GitopsResult<Vec<AuditLogEntry>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.entity == entity && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn cleanup(&self, older_than_days: i64, now: DateTime<Utc>) -> GitopsResult<CleanupCounts> {
        let cutoff = now - chrono::Duration::days(older_than_days);
        let mut tables = self.tables.write().unwrap();
        let mut counts = CleanupCounts::default();

        let terminal_ids: Vec<Uuid> = tables
            .deployments
            .values()
            .filter(|d| d.state.is_terminal() && d.completed_at.map(|c| c < cutoff).unwrap_or(false))
            .map(|d| d.id)
            .collect();

        for id in terminal_ids {
            tables.deployments.remove(&id);
            counts.deployments += 1;
            if let Some(logs) = tables.deployment_logs.remove(&id) {
                counts.deployment_logs += logs.len() as u64;
            }
            if let Some(files) = tables.deployment_files.remove(&id) {
                counts.deployment_files += files.len() as u64;
            }
        }

        let before = tables.pipeline_runs.len();
        tables
            .pipeline_runs
            .retain(|_, r| !(r.status.is_terminal() && r.completed_at.map(|c| c < cutoff).unwrap_or(false)));
        counts.pipeline_runs = (before - tables.pipeline_runs.len()) as u64;

        let before = tables.metric_points.len();
        tables.metric_points.retain(|p| p.timestamp >= cutoff);
        counts.metric_points = (before - tables.metric_points.len()) as u64;

        Ok(counts)
    }

    async fn health_check(&self) -> GitopsResult<StoreHealth> {
        let tables = self.tables.read().unwrap();
        let mut health = StoreHealth { reachable: true, ..Default::default() };
        for d in tables.deployments.values() {
            match d.state {
                DeploymentState::Queued => health.queued += 1,
                DeploymentState::InProgress => health.in_progress += 1,
                _ if d.state.is_terminal() => health.terminal += 1,
                _ => {}
            }
        }
        Ok(health)
    }
}
