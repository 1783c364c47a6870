//! End-to-end coverage of the Operator API surface against an in-memory
//! store and fake `RepoHost`/`RemoteFS`/`HealthChecker`, grounded in the
//! crate-level admission tests `gitaudit-webhooks` already has for the
//! same fake shapes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use gitaudit_auth::AuthService;
use gitaudit_capabilities::{Branch, Commit, FileContent, FileInfo, PullRequest, RemoteFS, RepoHost};
use gitaudit_core::{GitopsResult, RateLimiterRegistry};
use gitaudit_deploy::health::{HealthChecker, HealthResponse};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_eventbus::EventBus;
use gitaudit_metrics::MetricsAggregator;
use gitaudit_orchestrator::OrchestrationEngine;
use gitaudit_pipelines::{PipelineSupervisor, ProcessCodeHost};
use gitaudit_server::{router, AppState, Config};
use gitaudit_store::{InMemoryStore, Store, User};
use gitaudit_webhooks::WebhookAdmission;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct FakeRepoHost;

#[async_trait::async_trait]
impl RepoHost for FakeRepoHost {
    async fn get_file(&self, _owner: &str, _repo: &str, _path: &str, _git_ref: Option<&str>) -> GitopsResult<FileContent> {
        Err(gitaudit_core::GitopsError::not_found("no such file"))
    }
    async fn put_file(&self, _owner: &str, _repo: &str, _path: &str, _content: &[u8], _message: &str, _branch: &str, _sha: Option<&str>) -> GitopsResult<gitaudit_capabilities::CommitRef> {
        Ok(gitaudit_capabilities::CommitRef { sha: "cafef00d".to_string(), url: "https://example.invalid".to_string() })
    }
    async fn list_branches(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<Branch>> {
        Ok(vec![Branch { name: "main".to_string(), sha: "deadbeef".to_string() }])
    }
    async fn list_commits(&self, _owner: &str, _repo: &str, _branch: &str) -> GitopsResult<Vec<Commit>> {
        Ok(vec![Commit { sha: "deadbeef".to_string(), message: "msg".to_string(), author: "someone".to_string() }])
    }
    async fn create_branch(&self, _owner: &str, _repo: &str, _name: &str, _from_sha: &str) -> GitopsResult<Branch> {
        unimplemented!()
    }
    async fn list_tags(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<String>> {
        Ok(vec![])
    }
    async fn create_pull_request(&self, _owner: &str, _repo: &str, _title: &str, _head: &str, _base: &str) -> GitopsResult<PullRequest> {
        unimplemented!()
    }
    async fn list_pull_requests(&self, _owner: &str, _repo: &str, _state: &str) -> GitopsResult<Vec<PullRequest>> {
        Ok(vec![])
    }
}

#[derive(Default)]
struct FakeRemoteFS {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait::async_trait]
impl RemoteFS for FakeRemoteFS {
    async fn create_dir(&self, _share: &str, _path: &str) -> GitopsResult<()> {
        Ok(())
    }
    async fn write_file(&self, share: &str, path: &str, bytes: &[u8]) -> GitopsResult<()> {
        self.files.lock().unwrap().insert((share.to_string(), path.to_string()), bytes.to_vec());
        Ok(())
    }
    async fn read_file(&self, share: &str, path: &str) -> GitopsResult<Vec<u8>> {
        Ok(self.files.lock().unwrap().get(&(share.to_string(), path.to_string())).cloned().unwrap_or_default())
    }
    async fn list(&self, _share: &str, _path: &str) -> GitopsResult<Vec<FileInfo>> {
        Ok(vec![])
    }
    async fn delete(&self, _share: &str, _path: &str) -> GitopsResult<()> {
        Ok(())
    }
    async fn get_info(&self, _share: &str, _path: &str) -> GitopsResult<FileInfo> {
        unimplemented!()
    }
}

struct AlwaysHealthy;

#[async_trait::async_trait]
impl HealthChecker for AlwaysHealthy {
    async fn check(&self, _url: &str) -> GitopsResult<HealthResponse> {
        Ok(HealthResponse { status: 200, body: "ok".to_string() })
    }
}

async fn test_state() -> AppState {
    let config = Arc::new(Config {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: None,
        workers_deployment_pool: 1,
        workers_pipeline_poll_min: Duration::from_secs(1),
        workers_pipeline_poll_max: Duration::from_secs(2),
        limits_max_content_bytes: 1024 * 1024,
        limits_webhook_dedup_ttl_seconds: 3600,
        limits_sessions_concurrent: 5,
        retention_backup_days: 30,
        retention_terminal_days: 90,
        auth_session_ttl: Duration::from_secs(3600),
        rate_limits_pipeline_trigger_per_minute: 30,
        paths_remote_fs_roots: vec!["/srv".to_string()],
        webhook_secrets: HashMap::from([("github".to_string(), "topsecret".to_string())]),
        repo_host_tool_path: "gh".to_string(),
        remote_fs_tool_path: "smbclient".to_string(),
        eventbus_subscriber_capacity: 64,
    });

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store
        .insert_user(User {
            id: Uuid::new_v4(),
            username: "operator1".to_string(),
            email: "operator1@example.com".to_string(),
            password_hash: gitaudit_auth::password::hash_password("hunter2hunter2").unwrap(),
            role: "operator".to_string(),
            created_at: Utc::now(),
            last_login: None,
            failed_attempts: 0,
            locked_until: None,
            is_active: true,
        })
        .await
        .unwrap();

    let repo_host = Arc::new(FakeRepoHost);
    let remote_fs = Arc::new(FakeRemoteFS::default());
    let events = Arc::new(EventBus::new(config.eventbus_subscriber_capacity));
    let auth = Arc::new(AuthService::new(store.clone()));
    let metrics = Arc::new(MetricsAggregator::new(store.clone()));

    let code_host_breaker = Arc::new(gitaudit_capabilities::CircuitBreaker::new(Default::default()));
    let code_host = Arc::new(ProcessCodeHost::new("gh", code_host_breaker));
    let pipelines = Arc::new(PipelineSupervisor::new(store.clone(), code_host, events.clone()));

    let deploy = Arc::new(DeploymentEngine::new(store.clone(), repo_host.clone(), remote_fs.clone(), Arc::new(AlwaysHealthy), events.clone()));
    let orchestrator = Arc::new(OrchestrationEngine::new(store.clone(), deploy.clone(), events.clone()));

    let rate_limiter = Arc::new(RateLimiterRegistry::new(600, 600));
    let webhooks = Arc::new(WebhookAdmission::new(
        store.clone(),
        deploy.clone(),
        config.webhook_secrets.clone(),
        rate_limiter,
        config.limits_webhook_dedup_ttl_seconds,
        config.limits_max_content_bytes,
    ));

    let metrics_handle = gitaudit_server::telemetry::install_recorder();
    AppState { config, store, repo_host, remote_fs, auth, metrics, pipelines, deploy, orchestrator, webhooks, events, metrics_handle }
}

async fn login_token(app: &axum::Router) -> String {
    let body = json!({ "username": "operator1", "password": "hunter2hunter2" }).to_string();
    let request = Request::builder().method("POST").uri("/auth/login").header("content-type", "application/json").body(Body::from(body)).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    parsed["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_with_bad_password_is_unauthorized() {
    let app = router(test_state().await);
    let body = json!({ "username": "operator1", "password": "wrong" }).to_string();
    let request = Request::builder().method("POST").uri("/auth/login").header("content-type", "application/json").body(Body::from(body)).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_without_a_token_is_unauthorized() {
    let app = router(test_state().await);
    let request = Request::builder().uri("/pipelines/status?repo=festion/home-assistant-config").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn operator_can_create_a_deployment_with_a_valid_session() {
    let app = router(test_state().await);
    let token = login_token(&app).await;

    let body = json!({ "repo": "festion/home-assistant-config", "branch": "main", "priority": "normal" }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/deployments")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(parsed["id"].is_string());
}

#[tokio::test]
async fn health_endpoint_needs_no_session() {
    let app = router(test_state().await);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["status"], "ok");
}

#[tokio::test]
async fn duplicate_webhook_delivery_is_accepted_twice_but_queues_once() {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let state = test_state().await;
    let store = state.store.clone();
    let app = router(state);

    let payload = json!({
        "repository": { "full_name": "festion/home-assistant-config" },
        "ref": "refs/heads/main",
        "after": "deadbeef",
    });
    let body = serde_json::to_vec(&payload).unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"topsecret").unwrap();
    mac.update(&body);
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/github/push")
            .header("content-type", "application/json")
            .header("x-github-signature-256", &signature)
            .header("x-github-delivery", "123e4567-e89b-12d3-a456-426614174000")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let deployments = store
        .list_deployments(gitaudit_store::DeploymentFilter {
            status: None,
            repository: Some("festion/home-assistant-config".to_string()),
            limit: 10,
            offset: 0,
        })
        .await
        .unwrap();
    assert_eq!(deployments.len(), 1);
}
