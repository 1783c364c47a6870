use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth_middleware::require_session;
use crate::handlers::{auth, compliance, deployments, health, pipelines, realtime, webhooks};
use crate::state::AppState;
use crate::telemetry;

pub fn build(state: AppState) -> Router {
    let body_limit = state.config.limits_max_content_bytes as usize;

    let authenticated = Router::new()
        .route("/pipelines/status", get(pipelines::status))
        .route("/pipelines/trigger", post(pipelines::trigger))
        .route("/pipelines/metrics", get(pipelines::metrics))
        .route("/compliance/status", get(compliance::status))
        .route("/compliance/check", post(compliance::check))
        .route("/compliance/apply", post(compliance::apply))
        .route("/deployments", post(deployments::create))
        .route("/deployments/:id", get(deployments::get))
        .route("/deployments/:id/logs", get(deployments::logs))
        .route("/deployments/:id/cancel", post(deployments::cancel))
        .route("/deployments/:id/rollback", post(deployments::rollback))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(telemetry::render))
        .route("/auth/login", post(auth::login))
        .route("/webhooks/:host/:event", post(webhooks::receive))
        .route("/realtime", get(realtime::upgrade))
        .merge(authenticated)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(CompressionLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(telemetry::track_http_metrics))
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
        .with_state(state)
}
