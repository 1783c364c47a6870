//! Process-level Prometheus metrics: one global recorder installed at
//! startup and scraped over `GET /metrics`, kept separate from the
//! domain rollups served by `gitaudit-metrics` under `/pipelines/metrics`
//! and `/compliance/status`.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global recorder on first call and hands back the same
/// handle on every later one — a process may only set the `metrics`
/// crate's global recorder once, and the composition root and the test
/// suite both need a handle to build `AppState`.
pub fn install_recorder() -> PrometheusHandle {
    RECORDER.get_or_init(|| PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder")).clone()
}

/// Records `gitaudit_http_requests_total` and
/// `gitaudit_http_request_duration_seconds` for every request that
/// reaches the router, tagged by method/path/status.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let latency = start.elapsed().as_secs_f64();
    metrics::counter!("gitaudit_http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    metrics::histogram!("gitaudit_http_request_duration_seconds", "method" => method, "path" => path).record(latency);

    response
}

/// `GET /metrics`: Prometheus exposition of the process-level counters
/// and histograms, as opposed to `GET /pipelines/metrics` and
/// `GET /compliance/status`, which serve domain data out of the store.
pub async fn render(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
