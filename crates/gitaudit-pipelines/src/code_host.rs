//! Thin process-backed client for the parts of the code host the
//! Pipeline Supervisor needs that `RepoHost` doesn't cover: triggering a workflow run and
//! reading back its latest status. Shares the circuit-breaker + timeout
//! shape `gitaudit_capabilities::repo_host::ProcessRepoHost` uses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitaudit_capabilities::CircuitBreaker;
use gitaudit_core::GitopsResult;
use gitaudit_capabilities::process;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Present only when the host replies `429`; seconds to wait before
    /// polling again.
    pub retry_after: Option<u64>,
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn trigger_workflow(&self, repo: &str, workflow: &str, params: &serde_json::Value) -> GitopsResult<String>;
    async fn get_run_status(&self, repo: &str, run_id: &str) -> GitopsResult<RunStatus>;
}

pub struct ProcessCodeHost {
    tool_path: String,
    timeout: Duration,
    breaker: Arc<CircuitBreaker>,
}

impl ProcessCodeHost {
    pub fn new(tool_path: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { tool_path: tool_path.into(), timeout: process::DEFAULT_TOOL_TIMEOUT, breaker }
    }
}

#[async_trait]
impl CodeHost for ProcessCodeHost {
    async fn trigger_workflow(&self, repo: &str, workflow: &str, params: &serde_json::Value) -> GitopsResult<String> {
        let tool_path = self.tool_path.clone();
        let timeout = self.timeout;
        let args = vec!["trigger".to_string(), repo.to_string(), workflow.to_string(), params.to_string()];
        #[derive(Deserialize)]
        struct TriggerResponse {
            run_id: String,
        }
        let response: TriggerResponse =
            self.breaker.call(|| async move { process::invoke_json(&tool_path, &args, timeout).await }).await?;
        Ok(response.run_id)
    }

    async fn get_run_status(&self, repo: &str, run_id: &str) -> GitopsResult<RunStatus> {
        let tool_path = self.tool_path.clone();
        let timeout = self.timeout;
        let args = vec!["status".to_string(), repo.to_string(), run_id.to_string()];
        self.breaker.call(|| async move { process::invoke_json(&tool_path, &args, timeout).await }).await
    }
}
