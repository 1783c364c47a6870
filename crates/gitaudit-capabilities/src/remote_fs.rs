//! `RemoteFS` capability: writes and reads files on a remote share
//! through a process-backed tool wrapper. Paths are validated before any
//! subprocess is spawned; content above the configured maximum is
//! rejected with `payloadTooLarge` without ever
//! shelling out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitaudit_core::{GitopsError, GitopsResult};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreaker;
use crate::process::{self, DEFAULT_TOOL_TIMEOUT};

pub const DEFAULT_MAX_WRITE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait RemoteFS: Send + Sync {
    async fn create_dir(&self, share: &str, path: &str) -> GitopsResult<()>;
    async fn write_file(&self, share: &str, path: &str, bytes: &[u8]) -> GitopsResult<()>;
    async fn read_file(&self, share: &str, path: &str) -> GitopsResult<Vec<u8>>;
    async fn list(&self, share: &str, path: &str) -> GitopsResult<Vec<FileInfo>>;
    async fn delete(&self, share: &str, path: &str) -> GitopsResult<()>;
    async fn get_info(&self, share: &str, path: &str) -> GitopsResult<FileInfo>;
}

/// Rejects `..` segments, repeated `/`, and absolute escapes before a path
/// ever reaches a subprocess.
pub fn validate_path(path: &str) -> GitopsResult<()> {
    if path.contains("//") {
        return Err(GitopsError::validation("path contains repeated separators"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(GitopsError::validation("path escapes the whitelisted root via '..'"));
    }
    if path.starts_with('/') || path.starts_with('~') {
        return Err(GitopsError::validation("path must be relative to the share root"));
    }
    Ok(())
}

pub struct ProcessRemoteFS {
    tool_path: String,
    timeout: Duration,
    max_write_bytes: u64,
    breaker: Arc<CircuitBreaker>,
}

impl ProcessRemoteFS {
    pub fn new(tool_path: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            tool_path: tool_path.into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_write_bytes: DEFAULT_MAX_WRITE_BYTES,
            breaker,
        }
    }

    pub fn with_max_write_bytes(mut self, max: u64) -> Self {
        self.max_write_bytes = max;
        self
    }

    async fn run_json<T: serde::de::DeserializeOwned>(&self, args: Vec<String>) -> GitopsResult<T> {
        let tool_path = self.tool_path.clone();
        let timeout = self.timeout;
        self.breaker.call(|| async move { process::invoke_json(&tool_path, &args, timeout).await }).await
    }

    async fn run_bytes(&self, args: Vec<String>) -> GitopsResult<Vec<u8>> {
        let tool_path = self.tool_path.clone();
        let timeout = self.timeout;
        self.breaker.call(|| async move { process::invoke(&tool_path, &args, timeout).await }).await
    }
}

#[async_trait]
impl RemoteFS for ProcessRemoteFS {
    async fn create_dir(&self, share: &str, path: &str) -> GitopsResult<()> {
        validate_path(path)?;
        self.run_bytes(vec!["mkdir".into(), share.into(), path.into()]).await.map(|_| ())
    }

    async fn write_file(&self, share: &str, path: &str, bytes: &[u8]) -> GitopsResult<()> {
        validate_path(path)?;
        if bytes.len() as u64 > self.max_write_bytes {
            return Err(GitopsError::payload_too_large(self.max_write_bytes));
        }
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.run_bytes(vec!["write".into(), share.into(), path.into(), encoded]).await.map(|_| ())
    }

    async fn read_file(&self, share: &str, path: &str) -> GitopsResult<Vec<u8>> {
        validate_path(path)?;
        self.run_bytes(vec!["read".into(), share.into(), path.into()]).await
    }

    async fn list(&self, share: &str, path: &str) -> GitopsResult<Vec<FileInfo>> {
        validate_path(path)?;
        self.run_json(vec!["list".into(), share.into(), path.into()]).await
    }

    async fn delete(&self, share: &str, path: &str) -> GitopsResult<()> {
        validate_path(path)?;
        self.run_bytes(vec!["delete".into(), share.into(), path.into()]).await.map(|_| ())
    }

    async fn get_info(&self, share: &str, path: &str) -> GitopsResult<FileInfo> {
        validate_path(path)?;
        self.run_json(vec!["stat".into(), share.into(), path.into()]).await
    }
}
