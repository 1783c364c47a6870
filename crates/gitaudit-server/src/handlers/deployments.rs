use axum::extract::{Extension, Path, State};
use axum::Json;
use gitaudit_core::{Action, GitopsError, Resource};
use gitaudit_store::{Deployment, DeploymentLog, Priority};
use serde::Deserialize;
use uuid::Uuid;

use super::{audit, require};
use crate::auth_middleware::AuthenticatedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateRequest {
    pub repo: String,
    pub branch: String,
    pub priority: Priority,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(serde::Serialize)]
pub struct CreateResponse {
    pub id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<CreateResponse>> {
    require(&user, Resource::Deployment, Action::Create)?;
    let parameters = if request.parameters.is_null() { serde_json::json!({}) } else { request.parameters };

    let (owner, name) = request.repo.split_once('/').unwrap_or((&request.repo, &request.repo));
    let branches = state.repo_host.list_branches(owner, name).await?;
    let head = branches
        .into_iter()
        .find(|b| b.name == request.branch)
        .ok_or_else(|| GitopsError::not_found(format!("branch {} not found on {}", request.branch, request.repo)))?;

    let id = state
        .deploy
        .submit(&request.repo, &request.branch, &head.sha, request.priority, &user.user.username, parameters)
        .await?;
    audit(&state, &user.user.username, "deployment.create", "deployment", &id.to_string(), serde_json::json!({"repo": request.repo, "branch": request.branch})).await;
    metrics::counter!("gitaudit_deployments_submitted_total").increment(1);
    Ok(Json(CreateResponse { id }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    require(&user, Resource::Deployment, Action::Read)?;
    let deployment = state.store.get_deployment(id).await?.ok_or_else(|| GitopsError::not_found(format!("deployment {id} not found")))?;
    Ok(Json(deployment))
}

pub async fn logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeploymentLog>>> {
    require(&user, Resource::Deployment, Action::Read)?;
    let logs = state.store.list_logs(id).await?;
    Ok(Json(logs))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&user, Resource::Deployment, Action::Cancel)?;
    state.deploy.cancel(id).await?;
    audit(&state, &user.user.username, "deployment.cancel", "deployment", &id.to_string(), serde_json::json!({})).await;
    metrics::counter!("gitaudit_deployments_cancelled_total").increment(1);
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

#[derive(Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn rollback(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<Json<Deployment>> {
    require(&user, Resource::Deployment, Action::Create)?;
    let reason = request.reason.unwrap_or_else(|| "operator-requested rollback".to_string());
    let rolled_back = state.deploy.rollback_deployment(id, &reason).await?;
    audit(&state, &user.user.username, "deployment.rollback", "deployment", &id.to_string(), serde_json::json!({"reason": reason})).await;
    metrics::counter!("gitaudit_deployments_rolled_back_total").increment(1);
    Ok(Json(rolled_back))
}
