//! Routes an admitted webhook to its downstream component:
//! `push`/`repository_dispatch` enqueue a deployment on the Deployment
//! Engine; `workflow_run` updates a pipeline run in the store, following
//! the existing non-regression guard in `Store::update_pipeline_run`
//! rather than re-implementing the rank check here.

use std::sync::Arc;

use chrono::Utc;
use gitaudit_core::{GitopsError, GitopsResult};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_store::{PipelineRun, PipelineStatus, Priority, Store};
use serde_json::Value;
use uuid::Uuid;

pub async fn dispatch(store: &Arc<dyn Store>, deploy: &Arc<DeploymentEngine>, host: &str, event_type: &str, payload: &Value) -> GitopsResult<()> {
    match event_type {
        "push" => dispatch_push(deploy, host, payload).await,
        "repository_dispatch" => dispatch_repository_dispatch(deploy, host, payload).await,
        "workflow_run" => dispatch_workflow_run(store, payload).await,
        "pull_request" => Ok(()),
        other => Err(GitopsError::validation(format!("no dispatch route for event type '{other}'"))),
    }
}

async fn dispatch_push(deploy: &Arc<DeploymentEngine>, host: &str, payload: &Value) -> GitopsResult<()> {
    let repository = field_str(payload, &["repository", "full_name"])?;
    let git_ref = field_str(payload, &["ref"])?;
    let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(&git_ref).to_string();
    let commit = field_str(payload, &["after"])?;

    deploy
        .submit(&repository, &branch, &commit, Priority::Normal, &format!("webhook:{host}"), payload.clone())
        .await
        .map(|_| ())
}

async fn dispatch_repository_dispatch(deploy: &Arc<DeploymentEngine>, host: &str, payload: &Value) -> GitopsResult<()> {
    let repository = field_str(payload, &["repository", "full_name"])?;
    let branch = payload.get("client_payload").and_then(|p| p.get("branch")).and_then(|v| v.as_str()).unwrap_or("main").to_string();

    deploy
        .submit(&repository, &branch, "", Priority::Normal, &format!("webhook:{host}"), payload.clone())
        .await
        .map(|_| ())
}

async fn dispatch_workflow_run(store: &Arc<dyn Store>, payload: &Value) -> GitopsResult<()> {
    let repository = field_str(payload, &["repository", "full_name"])?;
    let run = payload.get("workflow_run").ok_or_else(|| GitopsError::validation("missing workflow_run"))?;
    let run_id = run.get("id").and_then(|v| v.as_u64()).ok_or_else(|| GitopsError::validation("workflow_run.id missing"))?.to_string();
    let workflow_name = run.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let branch = run.get("head_branch").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let commit = run.get("head_sha").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let actor = run.get("actor").and_then(|a| a.get("login")).and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let github_status = run.get("status").and_then(|v| v.as_str()).unwrap_or("queued");
    let conclusion = run.get("conclusion").and_then(|v| v.as_str()).map(|s| s.to_string());

    let status = map_status(github_status, conclusion.as_deref());
    let existing = store.get_pipeline_run(&repository, &run_id).await?;

    let updated = PipelineRun {
        id: existing.as_ref().map(|r| r.id).unwrap_or_else(Uuid::new_v4),
        repository,
        branch,
        workflow_name,
        run_id,
        status,
        conclusion,
        started_at: existing.as_ref().map(|r| r.started_at).unwrap_or_else(Utc::now),
        completed_at: if status.is_terminal() { Some(Utc::now()) } else { None },
        commit,
        actor,
        jobs: existing.as_ref().map(|r| r.jobs.clone()).unwrap_or_else(|| serde_json::json!([])),
        steps: existing.as_ref().map(|r| r.steps.clone()).unwrap_or_else(|| serde_json::json!([])),
    };

    match existing {
        Some(_) => store.update_pipeline_run(updated).await,
        None => store.insert_pipeline_run(updated).await,
    }
}

fn map_status(github_status: &str, conclusion: Option<&str>) -> PipelineStatus {
    match github_status {
        "completed" => match conclusion {
            Some("success") => PipelineStatus::Success,
            Some("cancelled") => PipelineStatus::Cancelled,
            _ => PipelineStatus::Failure,
        },
        "in_progress" => PipelineStatus::Running,
        _ => PipelineStatus::Pending,
    }
}

fn field_str(payload: &Value, path: &[&str]) -> GitopsResult<String> {
    let mut cursor = payload;
    for segment in path {
        cursor = cursor.get(segment).ok_or_else(|| GitopsError::validation(format!("webhook payload missing required field '{}'", path.join("."))))?;
    }
    cursor.as_str().map(str::to_string).ok_or_else(|| GitopsError::validation(format!("field '{}' is not a string", path.join("."))))
}
