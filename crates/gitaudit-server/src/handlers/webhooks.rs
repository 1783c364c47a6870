use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use gitaudit_core::GitopsError;
use gitaudit_webhooks::AdmissionOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /webhooks/{host}/{event}`. The event name also arrives in
/// `X-{Host}-Event`; the path segment is authoritative since axum routes
/// on it, the header is not cross-checked.
pub async fn receive(
    State(state): State<AppState>,
    Path((host, event)): Path<(String, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    let signature_header = header_value(&headers, &format!("x-{host}-signature-256"));
    let delivery_id = header_value(&headers, &format!("x-{host}-delivery"))
        .ok_or_else(|| GitopsError::validation(format!("missing X-{host}-Delivery header")))?;

    let outcome = state.webhooks.admit(&host, &event, signature_header.as_deref(), &delivery_id, &body).await?;
    match outcome {
        AdmissionOutcome::Accepted => {
            metrics::counter!("gitaudit_webhooks_admitted_total", "host" => host, "event" => event).increment(1);
            Ok(StatusCode::OK)
        }
        AdmissionOutcome::Duplicate => {
            metrics::counter!("gitaudit_webhooks_duplicate_total", "host" => host, "event" => event).increment(1);
            Ok(StatusCode::OK)
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}
