use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tagged error taxonomy shared by every component. The `kind` is the
/// stable, user-visible classification; `message` is for humans;
/// `details` carries field-level context; `correlation_id` ties the
/// response back to the structured log line that recorded it.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GitopsError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    #[error("validationError")]
    ValidationError,
    #[error("policyViolation")]
    PolicyViolation,
    #[error("authFailed")]
    AuthFailed,
    #[error("notFound")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("rateLimited")]
    RateLimited,
    #[error("transport")]
    Transport,
    #[error("timeout")]
    Timeout,
    #[error("payloadTooLarge")]
    PayloadTooLarge,
    #[error("rollbackFailed")]
    RollbackFailed,
    #[error("internal")]
    Internal,
}

impl ErrorKind {
    /// Whether Deployment Engine steps 2-4 (and rollback in step 7) may retry
    /// an error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::RateLimited | ErrorKind::Timeout)
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::ValidationError => 400,
            ErrorKind::PolicyViolation => 403,
            ErrorKind::AuthFailed => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::Transport | ErrorKind::Timeout => 502,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::RollbackFailed => 500,
            ErrorKind::Internal => 500,
        }
    }
}

impl GitopsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: HashMap::new(),
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyViolation, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(ErrorKind::RateLimited, "rate limit exceeded")
            .with_detail("retryAfter", retry_after_secs.to_string())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn payload_too_large(max_bytes: u64) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, "payload exceeds configured maximum")
            .with_detail("maxBytes", max_bytes.to_string())
    }

    pub fn rollback_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RollbackFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

pub type GitopsResult<T> = Result<T, GitopsError>;
