//! Maps `GitopsError` onto an HTTP status via `ErrorKind::http_status`,
//! so every handler can propagate with `?` instead of hand-rolling a
//! status code per call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gitaudit_core::GitopsError;
use serde_json::json;

pub struct ApiError(pub GitopsError);

impl From<GitopsError> for ApiError {
    fn from(error: GitopsError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "kind": self.0.kind,
            "message": self.0.message,
            "details": self.0.details,
            "correlationId": self.0.correlation_id,
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
