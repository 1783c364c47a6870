use axum::extract::{Extension, Query, State};
use axum::Json;
use gitaudit_core::{Action, Resource};
use gitaudit_store::PipelineRun;
use serde::Deserialize;

use super::{audit, require};
use crate::auth_middleware::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusQuery {
    pub repo: String,
    pub limit: Option<i64>,
    pub offset: Option<usize>,
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    require(&user, Resource::Pipeline, Action::Read)?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);
    let runs = state.store.list_pipeline_runs(&query.repo, limit + offset as i64).await?;
    Ok(Json(runs.into_iter().skip(offset).collect()))
}

#[derive(Deserialize)]
pub struct TriggerRequest {
    pub repo: String,
    pub workflow: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(serde::Serialize)]
pub struct TriggerResponse {
    #[serde(rename = "runId")]
    pub run_id: String,
}

pub async fn trigger(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<Json<TriggerResponse>> {
    require(&user, Resource::Pipeline, Action::Trigger)?;
    let params = if request.params.is_null() { serde_json::json!({}) } else { request.params };
    let run_id = state.pipelines.trigger(&user.user.username, &request.repo, &request.workflow, params).await?;
    audit(&state, &user.user.username, "pipeline.trigger", "pipeline", &run_id, serde_json::json!({"repo": request.repo, "workflow": request.workflow})).await;
    metrics::counter!("gitaudit_pipelines_triggered_total").increment(1);
    Ok(Json(TriggerResponse { run_id }))
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    pub repo: String,
    #[serde(rename = "timeRange")]
    pub time_range: Option<String>,
}

pub async fn metrics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<gitaudit_pipelines::PipelineMetricsSummary>> {
    require(&user, Resource::Pipeline, Action::Read)?;
    let window_start = chrono::Utc::now() - parse_time_range(query.time_range.as_deref().unwrap_or("24h"))?;
    let summary = state.pipelines.metrics(&query.repo, window_start).await?;
    Ok(Json(summary))
}

fn parse_time_range(raw: &str) -> Result<chrono::Duration, ApiError> {
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: i64 = digits.parse().map_err(|_| gitaudit_core::GitopsError::validation(format!("invalid timeRange: {raw}")))?;
    match unit {
        "h" => Ok(chrono::Duration::hours(value)),
        "d" => Ok(chrono::Duration::days(value)),
        "m" => Ok(chrono::Duration::minutes(value)),
        _ => Err(gitaudit_core::GitopsError::validation(format!("invalid timeRange unit: {raw}")).into()),
    }
}
