//! `RepoHost` capability: reads and writes files against a remote code
//! host, lists refs, and opens pull requests. The core consumes this as
//! a trait object; the process-backed implementation shells out to a
//! host CLI wrapper, wrapped in a circuit breaker so a degraded host
//! doesn't starve the worker pool with doomed retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitaudit_core::GitopsResult;
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreaker;
use crate::process::{self, DEFAULT_TOOL_TIMEOUT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub head: String,
    pub base: String,
}

/// Contract: read-after-write consistency is not assumed; callers must
/// pass `sha` on `put_file` to update an existing file.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn get_file(&self, owner: &str, repo: &str, path: &str, git_ref: Option<&str>) -> GitopsResult<FileContent>;
    async fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &[u8],
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> GitopsResult<CommitRef>;
    async fn list_branches(&self, owner: &str, repo: &str) -> GitopsResult<Vec<Branch>>;
    async fn list_commits(&self, owner: &str, repo: &str, branch: &str) -> GitopsResult<Vec<Commit>>;
    async fn create_branch(&self, owner: &str, repo: &str, name: &str, from_sha: &str) -> GitopsResult<Branch>;
    async fn list_tags(&self, owner: &str, repo: &str) -> GitopsResult<Vec<String>>;
    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
    ) -> GitopsResult<PullRequest>;
    async fn list_pull_requests(&self, owner: &str, repo: &str, state: &str) -> GitopsResult<Vec<PullRequest>>;
}

/// Invokes a configured host-specific CLI wrapper (e.g. `gh`, `glab`) as a
/// single subprocess per call, one argv per operation.
pub struct ProcessRepoHost {
    tool_path: String,
    timeout: Duration,
    breaker: Arc<CircuitBreaker>,
}

impl ProcessRepoHost {
    pub fn new(tool_path: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { tool_path: tool_path.into(), timeout: DEFAULT_TOOL_TIMEOUT, breaker }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run<T: serde::de::DeserializeOwned>(&self, args: Vec<String>) -> GitopsResult<T> {
        let tool_path = self.tool_path.clone();
        let timeout = self.timeout;
        self.breaker.call(|| async move { process::invoke_json(&tool_path, &args, timeout).await }).await
    }
}

#[async_trait]
impl RepoHost for ProcessRepoHost {
    async fn get_file(&self, owner: &str, repo: &str, path: &str, git_ref: Option<&str>) -> GitopsResult<FileContent> {
        let mut args = vec!["get-file".into(), owner.into(), repo.into(), path.into()];
        if let Some(r) = git_ref {
            args.push(r.into());
        }
        self.run(args).await
    }

    async fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &[u8],
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> GitopsResult<CommitRef> {
        let mut args = vec![
            "put-file".into(),
            owner.into(),
            repo.into(),
            path.into(),
            base64_encode(content),
            message.into(),
            branch.into(),
        ];
        if let Some(sha) = sha {
            args.push(sha.into());
        }
        self.run(args).await
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> GitopsResult<Vec<Branch>> {
        self.run(vec!["list-branches".into(), owner.into(), repo.into()]).await
    }

    async fn list_commits(&self, owner: &str, repo: &str, branch: &str) -> GitopsResult<Vec<Commit>> {
        self.run(vec!["list-commits".into(), owner.into(), repo.into(), branch.into()]).await
    }

    async fn create_branch(&self, owner: &str, repo: &str, name: &str, from_sha: &str) -> GitopsResult<Branch> {
        self.run(vec!["create-branch".into(), owner.into(), repo.into(), name.into(), from_sha.into()]).await
    }

    async fn list_tags(&self, owner: &str, repo: &str) -> GitopsResult<Vec<String>> {
        self.run(vec!["list-tags".into(), owner.into(), repo.into()]).await
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
    ) -> GitopsResult<PullRequest> {
        self.run(vec!["create-pr".into(), owner.into(), repo.into(), title.into(), head.into(), base.into()]).await
    }

    async fn list_pull_requests(&self, owner: &str, repo: &str, state: &str) -> GitopsResult<Vec<PullRequest>> {
        self.run(vec!["list-prs".into(), owner.into(), repo.into(), state.into()]).await
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
