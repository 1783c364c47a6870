//! Postgres-backed `Store`. SQL lives only here and in `sql/*.sql` rather
//! than scattered as inline strings through the call sites that need it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitaudit_core::{GitopsError, GitopsResult};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::store::{DeploymentStateUpdate, Store};
use crate::types::*;

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn internal(err: sqlx::Error) -> GitopsError {
    GitopsError::internal(format!("store error: {err}"))
}

#[async_trait]
impl Store for PgStore {
    async fn insert_deployment(&self, d: Deployment) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO deployments
                (id, repository, branch, commit, state, priority, requested_by, requested_at,
                 started_at, completed_at, retry_count, max_retries, backup_ref, error_message,
                 original_deployment_id, parameters, correlation_id, worker_id)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
        )
        .bind(d.id)
        .bind(&d.repository)
        .bind(&d.branch)
        .bind(&d.commit)
        .bind(d.state)
        .bind(d.priority)
        .bind(&d.requested_by)
        .bind(d.requested_at)
        .bind(d.started_at)
        .bind(d.completed_at)
        .bind(d.retry_count)
        .bind(d.max_retries)
        .bind(&d.backup_ref)
        .bind(&d.error_message)
        .bind(d.original_deployment_id)
        .bind(&d.parameters)
        .bind(&d.correlation_id)
        .bind(&d.worker_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn claim_next_queued(&self, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>> {
        // Single round-trip CAS: pick the best queued candidate whose
        // (repository, branch) has no in-progress row, lock it, and flip
        // it atomically. `FOR UPDATE SKIP LOCKED` keeps two workers from
        // racing the same candidate.
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let row = sqlx::query(
            "SELECT id FROM deployments d
             WHERE d.state = 'queued'
               AND NOT EXISTS (
                   SELECT 1 FROM deployments o
                   WHERE o.repository = d.repository AND o.branch = d.branch AND o.state = 'in-progress'
               )
             ORDER BY
               CASE d.priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END,
               d.requested_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?;

        let Some(row) = row else {
            tx.commit().await.map_err(internal)?;
            return Ok(None);
        };
        let id: Uuid = row.get("id");

        sqlx::query("UPDATE deployments SET state = 'in-progress', started_at = $2, worker_id = $3 WHERE id = $1")
            .bind(id)
            .bind(now)
            .bind(worker_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        let deployment: Deployment = sqlx::query_as("SELECT * FROM deployments WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok(Some(deployment))
    }

    async fn claim_deployment(&self, id: Uuid, worker_id: &str, now: DateTime<Utc>) -> GitopsResult<Option<Deployment>> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let row = sqlx::query("SELECT id FROM deployments WHERE id = $1 AND state = 'queued' FOR UPDATE SKIP LOCKED")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;

        if row.is_none() {
            tx.commit().await.map_err(internal)?;
            return Ok(None);
        }

        sqlx::query("UPDATE deployments SET state = 'in-progress', started_at = $2, worker_id = $3 WHERE id = $1")
            .bind(id)
            .bind(now)
            .bind(worker_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        let deployment: Deployment = sqlx::query_as("SELECT * FROM deployments WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok(Some(deployment))
    }

    async fn get_deployment(&self, id: Uuid) -> GitopsResult<Option<Deployment>> {
        sqlx::query_as("SELECT * FROM deployments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn list_deployments(&self, filter: DeploymentFilter) -> GitopsResult<Vec<Deployment>> {
        let limit = if filter.limit <= 0 { 50 } else { filter.limit };
        sqlx::query_as(
            "SELECT * FROM deployments
             WHERE ($1::text IS NULL OR state = $1)
               AND ($2::text IS NULL OR repository = $2)
             ORDER BY requested_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(filter.status)
        .bind(filter.repository)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn update_deployment_state(&self, id: Uuid, mutate: DeploymentStateUpdate) -> GitopsResult<Deployment> {
        let mut tx = self.pool.begin().await.map_err(internal)?;
        let current: Deployment = sqlx::query_as("SELECT * FROM deployments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or_else(|| GitopsError::not_found(format!("deployment {id} not found")))?;

        if current.state.is_terminal() {
            return Err(GitopsError::conflict("deployment is already in a terminal state"));
        }

        sqlx::query(
            "UPDATE deployments SET
                state = $2,
                started_at = COALESCE($3, started_at),
                completed_at = COALESCE($4, completed_at),
                backup_ref = COALESCE($5, backup_ref),
                error_message = COALESCE($6, error_message),
                retry_count = COALESCE($7, retry_count)
             WHERE id = $1",
        )
        .bind(id)
        .bind(mutate.state)
        .bind(mutate.started_at)
        .bind(mutate.completed_at)
        .bind(&mutate.backup_ref)
        .bind(&mutate.error_message)
        .bind(mutate.retry_count)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        let updated: Deployment = sqlx::query_as("SELECT * FROM deployments WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
        tx.commit().await.map_err(internal)?;
        Ok(updated)
    }

    async fn has_in_progress(&self, repository: &str, branch: &str) -> GitopsResult<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM deployments WHERE repository = $1 AND branch = $2 AND state = 'in-progress')",
        )
        .bind(repository)
        .bind(branch)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.0)
    }

    async fn append_log(&self, log: DeploymentLog) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO deployment_logs (id, deployment_id, level, channel, message, timestamp, metadata)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(log.id)
        .bind(log.deployment_id)
        .bind(log.level)
        .bind(log.channel)
        .bind(&log.message)
        .bind(log.timestamp)
        .bind(&log.metadata)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn list_logs(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentLog>> {
        sqlx::query_as("SELECT * FROM deployment_logs WHERE deployment_id = $1 ORDER BY timestamp ASC")
            .bind(deployment_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
    }

    async fn upsert_file(&self, file: DeploymentFile) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO deployment_files (id, deployment_id, path, op, size, hash, backup_path, status, error_message)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, error_message = EXCLUDED.error_message,
                hash = EXCLUDED.hash, backup_path = EXCLUDED.backup_path",
        )
        .bind(file.id)
        .bind(file.deployment_id)
        .bind(&file.path)
        .bind(file.op)
        .bind(file.size)
        .bind(&file.hash)
        .bind(&file.backup_path)
        .bind(file.status)
        .bind(&file.error_message)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn list_files(&self, deployment_id: Uuid) -> GitopsResult<Vec<DeploymentFile>> {
        sqlx::query_as("SELECT * FROM deployment_files WHERE deployment_id = $1")
            .bind(deployment_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
    }

    async fn insert_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO pipeline_runs
                (id, repository, branch, workflow_name, run_id, status, conclusion, started_at,
                 completed_at, commit, actor, jobs, steps)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(run.id)
        .bind(&run.repository)
        .bind(&run.branch)
        .bind(&run.workflow_name)
        .bind(&run.run_id)
        .bind(run.status)
        .bind(&run.conclusion)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.commit)
        .bind(&run.actor)
        .bind(&run.jobs)
        .bind(&run.steps)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_pipeline_run(&self, run: PipelineRun) -> GitopsResult<()> {
        let mut tx = self.pool.begin().await.map_err(internal)?;
        let existing: Option<PipelineRun> =
            sqlx::query_as("SELECT * FROM pipeline_runs WHERE repository = $1 AND run_id = $2 FOR UPDATE")
                .bind(&run.repository)
                .bind(&run.run_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?;

        if let Some(existing) = &existing {
            if run.status.rank() < existing.status.rank() {
                return Err(GitopsError::conflict("pipeline status would regress"));
            }
        }

        sqlx::query(
            "UPDATE pipeline_runs SET status=$3, conclusion=$4, completed_at=$5, jobs=$6, steps=$7
             WHERE repository = $1 AND run_id = $2",
        )
        .bind(&run.repository)
        .bind(&run.run_id)
        .bind(run.status)
        .bind(&run.conclusion)
        .bind(run.completed_at)
        .bind(&run.jobs)
        .bind(&run.steps)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok(())
    }

    async fn get_pipeline_run(&self, repository: &str, run_id: &str) -> GitopsResult<Option<PipelineRun>> {
        sqlx::query_as("SELECT * FROM pipeline_runs WHERE repository = $1 AND run_id = $2")
            .bind(repository)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn list_pipeline_runs(&self, repository: &str, limit: i64) -> GitopsResult<Vec<PipelineRun>> {
        let limit = if limit <= 0 { 50 } else { limit };
        sqlx::query_as("SELECT * FROM pipeline_runs WHERE repository = $1 ORDER BY started_at DESC LIMIT $2")
            .bind(repository)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
    }

    async fn upsert_template(&self, template: Template) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO templates (id, name, version, template_type, required_files, required_directories, scoring_weights)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (name) DO UPDATE SET version=EXCLUDED.version, template_type=EXCLUDED.template_type,
                required_files=EXCLUDED.required_files, required_directories=EXCLUDED.required_directories,
                scoring_weights=EXCLUDED.scoring_weights",
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.version)
        .bind(&template.template_type)
        .bind(serde_json::to_value(&template.required_files).map_err(|e| GitopsError::internal(e.to_string()))?)
        .bind(serde_json::to_value(&template.required_directories).map_err(|e| GitopsError::internal(e.to_string()))?)
        .bind(serde_json::to_value(&template.scoring_weights).map_err(|e| GitopsError::internal(e.to_string()))?)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_template(&self, name: &str) -> GitopsResult<Option<Template>> {
        let row = sqlx::query("SELECT * FROM templates WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.map(template_from_row).transpose()
    }

    async fn list_templates(&self) -> GitopsResult<Vec<Template>> {
        let rows = sqlx::query("SELECT * FROM templates").fetch_all(&self.pool).await.map_err(internal)?;
        rows.into_iter().map(template_from_row).collect()
    }

    async fn upsert_repository_compliance(&self, c: RepositoryCompliance) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO repository_compliance (repository, applied_templates, missing_templates, issues, score, compliant)
             VALUES ($1,$2,$3,$4,$5,$6)
             ON CONFLICT (repository) DO UPDATE SET applied_templates=EXCLUDED.applied_templates,
                missing_templates=EXCLUDED.missing_templates, issues=EXCLUDED.issues, score=EXCLUDED.score,
                compliant=EXCLUDED.compliant",
        )
        .bind(&c.repository)
        .bind(serde_json::to_value(&c.applied_templates).map_err(|e| GitopsError::internal(e.to_string()))?)
        .bind(serde_json::to_value(&c.missing_templates).map_err(|e| GitopsError::internal(e.to_string()))?)
        .bind(serde_json::to_value(&c.issues).map_err(|e| GitopsError::internal(e.to_string()))?)
        .bind(c.score as i32)
        .bind(c.compliant)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_repository_compliance(&self, repository: &str) -> GitopsResult<Option<RepositoryCompliance>> {
        let row = sqlx::query("SELECT * FROM repository_compliance WHERE repository = $1")
            .bind(repository)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.map(compliance_from_row).transpose()
    }

    async fn list_repository_compliance(&self, min_score: Option<u32>) -> GitopsResult<Vec<RepositoryCompliance>> {
        let rows = sqlx::query("SELECT * FROM repository_compliance WHERE score >= $1")
            .bind(min_score.unwrap_or(0) as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        rows.into_iter().map(compliance_from_row).collect()
    }

    async fn insert_metric_point(&self, point: MetricPoint) -> GitopsResult<()> {
        sqlx::query("INSERT INTO metric_points (kind, entity, timestamp, value, unit, tags) VALUES ($1,$2,$3,$4,$5,$6)")
            .bind(&point.kind)
            .bind(&point.entity)
            .bind(point.timestamp)
            .bind(point.value)
            .bind(&point.unit)
            .bind(&point.tags)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn query_metric_points(
        &self,
        kind: &str,
        entity: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GitopsResult<Vec<MetricPoint>> {
        sqlx::query_as(
            "SELECT * FROM metric_points WHERE kind = $1 AND entity = $2 AND timestamp BETWEEN $3 AND $4
             ORDER BY timestamp ASC",
        )
        .bind(kind)
        .bind(entity)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn upsert_aggregated_metric(&self, metric: AggregatedMetric) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO aggregated_metrics (kind, entity, interval, bucket_start, aggregations)
             VALUES ($1,$2,$3,$4,$5)
             ON CONFLICT (kind, entity, interval, bucket_start) DO UPDATE SET aggregations = EXCLUDED.aggregations",
        )
        .bind(&metric.kind)
        .bind(&metric.entity)
        .bind(metric.interval)
        .bind(metric.bucket_start)
        .bind(serde_json::to_value(&metric.aggregations).map_err(|e| GitopsError::internal(e.to_string()))?)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_aggregated_metric(
        &self,
        kind: &str,
        entity: &str,
        interval: Interval,
        bucket_start: DateTime<Utc>,
    ) -> GitopsResult<Option<AggregatedMetric>> {
        let row = sqlx::query(
            "SELECT * FROM aggregated_metrics WHERE kind=$1 AND entity=$2 AND interval=$3 AND bucket_start=$4",
        )
        .bind(kind)
        .bind(entity)
        .bind(interval)
        .bind(bucket_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(aggregated_metric_from_row).transpose()
    }

    async fn upsert_profile(&self, profile: OrchestrationProfile) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO orchestration_profiles (name, definition) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET definition = EXCLUDED.definition",
        )
        .bind(&profile.name)
        .bind(serde_json::to_value(&profile).map_err(|e| GitopsError::internal(e.to_string()))?)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_profile(&self, name: &str) -> GitopsResult<Option<OrchestrationProfile>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT definition FROM orchestration_profiles WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;
        row.map(|(v,)| serde_json::from_value(v).map_err(|e| GitopsError::internal(e.to_string()))).transpose()
    }

    async fn insert_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO orchestration_runs (id, profile_name, state, started_at, completed_at, completed_actions, failed_actions)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(run.id)
        .bind(&run.profile_name)
        .bind(run.state)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.completed_actions)
        .bind(&run.failed_actions)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_orchestration_run(&self, run: OrchestrationRun) -> GitopsResult<()> {
        sqlx::query(
            "UPDATE orchestration_runs SET state=$2, completed_at=$3, completed_actions=$4, failed_actions=$5 WHERE id=$1",
        )
        .bind(run.id)
        .bind(run.state)
        .bind(run.completed_at)
        .bind(&run.completed_actions)
        .bind(&run.failed_actions)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_orchestration_run(&self, id: Uuid) -> GitopsResult<Option<OrchestrationRun>> {
        sqlx::query_as("SELECT * FROM orchestration_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn insert_user(&self, user: User) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, last_login, failed_attempts, locked_until, is_active)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .bind(user.last_login)
        .bind(user.failed_attempts)
        .bind(user.locked_until)
        .bind(user.is_active)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> GitopsResult<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn get_user(&self, id: Uuid) -> GitopsResult<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(internal)
    }

    async fn update_user(&self, user: User) -> GitopsResult<()> {
        sqlx::query(
            "UPDATE users SET email=$2, password_hash=$3, role=$4, last_login=$5, failed_attempts=$6, locked_until=$7, is_active=$8
             WHERE id=$1",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.last_login)
        .bind(user.failed_attempts)
        .bind(user.locked_until)
        .bind(user.is_active)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn insert_api_key(&self, key: ApiKey) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO api_keys (id, user_id, prefix, key_hash, created_at, last_used, expires_at, revoked)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(key.id)
        .bind(key.user_id)
        .bind(&key.prefix)
        .bind(&key.key_hash)
        .bind(key.created_at)
        .bind(key.last_used)
        .bind(key.expires_at)
        .bind(key.revoked)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_api_key_by_prefix(&self, prefix: &str) -> GitopsResult<Option<ApiKey>> {
        sqlx::query_as("SELECT * FROM api_keys WHERE prefix = $1")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn update_api_key_last_used(&self, id: Uuid, at: DateTime<Utc>) -> GitopsResult<()> {
        sqlx::query("UPDATE api_keys SET last_used = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn insert_session(&self, session: Session) -> GitopsResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at, last_activity, is_active)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_activity)
        .bind(session.is_active)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> GitopsResult<Option<Session>> {
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn list_active_sessions_for_user(&self, user_id: Uuid) -> GitopsResult<Vec<Session>> {
        sqlx::query_as("SELECT * FROM sessions WHERE user_id = $1 AND is_active ORDER BY created_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
    }

    async fn update_session(&self, session: Session) -> GitopsResult<()> {
        sqlx::query("UPDATE sessions SET last_activity=$2, is_active=$3, expires_at=$4 WHERE id=$1")
            .bind(session.id)
            .bind(session.last_activity)
            .bind(session.is_active)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> GitopsResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1").bind(id).execute(&self.pool).await.map_err(internal)?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> GitopsResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected())
    }

    async fn record_webhook_delivery(
        &self,
        host: &str,
        delivery_id: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> GitopsResult<bool> {
        let expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);
        let result = sqlx::query(
            "INSERT INTO webhook_deliveries (host, delivery_id, expires_at) VALUES ($1,$2,$3)
             ON CONFLICT (host, delivery_id) DO UPDATE SET expires_at = EXCLUDED.expires_at
             WHERE webhook_deliveries.expires_at <= $4",
        )
        .bind(host)
        .bind(delivery_id)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_audit_entry(&self, entry: AuditLogEntry) -> GitopsResult<()> {
        sqlx::query("INSERT INTO audit_log (id, actor, action, entity, entity_id, detail, at) VALUES ($1,$2,$3,$4,$5,$6,$7)")
            .bind(entry.id)
            .bind(&entry.actor)
            .bind(&entry.action)
            .bind(&entry.entity)
            .bind(&entry.entity_id)
            .bind(&entry.detail)
            .bind(entry.at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn list_audit_entries(&self, entity: &str, entity_id: &str) -> GitopsResult<Vec<AuditLogEntry>> {
        sqlx::query_as("SELECT * FROM audit_log WHERE entity = $1 AND entity_id = $2 ORDER BY at DESC")
            .bind(entity)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
    }

    async fn cleanup(&self, older_than_days: i64, now: DateTime<Utc>) -> GitopsResult<CleanupCounts> {
        let cutoff = now - chrono::Duration::days(older_than_days);
        let mut counts = CleanupCounts::default();

        let deployments = sqlx::query(
            "DELETE FROM deployments WHERE state IN ('completed','failed','rolled-back','cancelled') AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        counts.deployments = deployments.rows_affected();

        let pipeline_runs = sqlx::query("DELETE FROM pipeline_runs WHERE status IN ('success','failure','cancelled') AND completed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        counts.pipeline_runs = pipeline_runs.rows_affected();

        let metric_points = sqlx::query("DELETE FROM metric_points WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        counts.metric_points = metric_points.rows_affected();

        Ok(counts)
    }

    async fn health_check(&self) -> GitopsResult<StoreHealth> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.map_err(internal)?;

        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT
                COUNT(*) FILTER (WHERE state = 'queued'),
                COUNT(*) FILTER (WHERE state = 'in-progress'),
                COUNT(*) FILTER (WHERE state IN ('completed','failed','rolled-back','cancelled'))
             FROM deployments",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;

        Ok(StoreHealth { reachable: true, queued: row.0, in_progress: row.1, terminal: row.2 })
    }
}

fn template_from_row(row: sqlx::postgres::PgRow) -> GitopsResult<Template> {
    let required_files: serde_json::Value = row.try_get("required_files").map_err(internal)?;
    let required_directories: serde_json::Value = row.try_get("required_directories").map_err(internal)?;
    let scoring_weights: serde_json::Value = row.try_get("scoring_weights").map_err(internal)?;
    Ok(Template {
        id: row.try_get("id").map_err(internal)?,
        name: row.try_get("name").map_err(internal)?,
        version: row.try_get("version").map_err(internal)?,
        template_type: row.try_get("template_type").map_err(internal)?,
        required_files: serde_json::from_value(required_files).map_err(|e| GitopsError::internal(e.to_string()))?,
        required_directories: serde_json::from_value(required_directories)
            .map_err(|e| GitopsError::internal(e.to_string()))?,
        scoring_weights: serde_json::from_value(scoring_weights).map_err(|e| GitopsError::internal(e.to_string()))?,
    })
}

fn compliance_from_row(row: sqlx::postgres::PgRow) -> GitopsResult<RepositoryCompliance> {
    let applied_templates: serde_json::Value = row.try_get("applied_templates").map_err(internal)?;
    let missing_templates: serde_json::Value = row.try_get("missing_templates").map_err(internal)?;
    let issues: serde_json::Value = row.try_get("issues").map_err(internal)?;
    Ok(RepositoryCompliance {
        repository: row.try_get("repository").map_err(internal)?,
        applied_templates: serde_json::from_value(applied_templates).map_err(|e| GitopsError::internal(e.to_string()))?,
        missing_templates: serde_json::from_value(missing_templates).map_err(|e| GitopsError::internal(e.to_string()))?,
        issues: serde_json::from_value(issues).map_err(|e| GitopsError::internal(e.to_string()))?,
        score: row.try_get::<i32, _>("score").map_err(internal)? as u32,
        compliant: row.try_get("compliant").map_err(internal)?,
    })
}

fn aggregated_metric_from_row(row: sqlx::postgres::PgRow) -> GitopsResult<AggregatedMetric> {
    let aggregations: serde_json::Value = row.try_get("aggregations").map_err(internal)?;
    Ok(AggregatedMetric {
        kind: row.try_get("kind").map_err(internal)?,
        entity: row.try_get("entity").map_err(internal)?,
        interval: row.try_get("interval").map_err(internal)?,
        bucket_start: row.try_get("bucket_start").map_err(internal)?,
        aggregations: serde_json::from_value(aggregations).map_err(|e| GitopsError::internal(e.to_string()))?,
    })
}
