use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gitaudit_capabilities::{Branch, Commit, FileContent, FileInfo, PullRequest, RemoteFS, RepoHost};
use gitaudit_core::{EventPublisher, GitopsResult, NoopEventPublisher, RateLimiterRegistry};
use gitaudit_deploy::health::{HealthChecker, HealthResponse};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_store::{DeploymentFilter, InMemoryStore, Store};
use gitaudit_webhooks::{AdmissionOutcome, WebhookAdmission};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

struct NoopRepoHost;

#[async_trait::async_trait]
impl RepoHost for NoopRepoHost {
    async fn get_file(&self, _owner: &str, _repo: &str, _path: &str, _git_ref: Option<&str>) -> GitopsResult<FileContent> {
        Ok(FileContent { content: String::new(), sha: "sha".to_string() })
    }
    async fn put_file(&self, _owner: &str, _repo: &str, _path: &str, _content: &[u8], _message: &str, _branch: &str, _sha: Option<&str>) -> GitopsResult<gitaudit_capabilities::CommitRef> {
        unimplemented!()
    }
    async fn list_branches(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<Branch>> {
        Ok(vec![])
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
struct NoopRemoteFS {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait::async_trait]
impl RemoteFS for NoopRemoteFS {
    async fn create_dir(&self, _share: &str, _path: &str) -> GitopsResult<()> {
        Ok(())
    }
    async fn write_file(&self, share: &str, path: &str, bytes: &[u8]) -> GitopsResult<()> {
        self.files.lock().unwrap().insert((share.to_string(), path.to_string()), bytes.to_vec());
        Ok(())
    }
    async fn read_file(&self, _share: &str, _path: &str) -> GitopsResult<Vec<u8>> {
        Ok(vec![])
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

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn harness() -> (WebhookAdmission, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let events: Arc<dyn EventPublisher> = Arc::new(NoopEventPublisher);
    let deploy = Arc::new(DeploymentEngine::new(store.clone(), Arc::new(NoopRepoHost), Arc::new(NoopRemoteFS::default()), Arc::new(AlwaysHealthy), events));
    let mut secrets = HashMap::new();
    secrets.insert("github".to_string(), "shared-secret".to_string());
    let rate_limiter = Arc::new(RateLimiterRegistry::new(60, 5));
    let admission = WebhookAdmission::new(store.clone(), deploy, secrets, rate_limiter, 86_400, 1_000_000);
    (admission, store)
}

#[tokio::test]
async fn a_correctly_signed_push_event_is_accepted_and_queues_a_deployment() {
    let (admission, store) = harness();
    let body = json!({
        "ref": "refs/heads/main",
        "after": "deadbeef",
        "repository": {"full_name": "festion/homelab-gitops-auditor"}
    })
    .to_string()
    .into_bytes();
    let signature = sign("shared-secret", &body);

    let outcome = admission.admit("github", "push", Some(&signature), "delivery-1", &body).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Accepted));

    let deployments = store.list_deployments(DeploymentFilter { status: None, repository: Some("festion/homelab-gitops-auditor".to_string()), limit: 10, offset: 0 }).await.unwrap();
    assert_eq!(deployments.len(), 1);
}

#[tokio::test]
async fn a_bad_signature_is_rejected_with_auth_failed() {
    let (admission, _store) = harness();
    let body = json!({"ref": "refs/heads/main", "after": "deadbeef", "repository": {"full_name": "festion/homelab-gitops-auditor"}}).to_string().into_bytes();

    let error = admission.admit("github", "push", Some("sha256=0000"), "delivery-1", &body).await.unwrap_err();
    assert_eq!(error.kind, gitaudit_core::ErrorKind::AuthFailed);
}

#[tokio::test]
async fn a_repeated_delivery_id_is_acknowledged_as_duplicate_without_reprocessing() {
    let (admission, store) = harness();
    let body = json!({"ref": "refs/heads/main", "after": "deadbeef", "repository": {"full_name": "festion/homelab-gitops-auditor"}}).to_string().into_bytes();
    let signature = sign("shared-secret", &body);

    admission.admit("github", "push", Some(&signature), "delivery-1", &body).await.unwrap();
    let second = admission.admit("github", "push", Some(&signature), "delivery-1", &body).await.unwrap();
    assert!(matches!(second, AdmissionOutcome::Duplicate));

    let deployments = store.list_deployments(DeploymentFilter { status: None, repository: Some("festion/homelab-gitops-auditor".to_string()), limit: 10, offset: 0 }).await.unwrap();
    assert_eq!(deployments.len(), 1);

    let audit = store.list_audit_entries("webhook", "delivery-1").await.unwrap();
    assert_eq!(audit.iter().filter(|e| e.detail["duplicate"] == true).count(), 1);
}

#[tokio::test]
async fn a_malformed_payload_is_rejected_as_a_validation_error() {
    let (admission, _store) = harness();
    let body = json!({"ref": "refs/heads/main", "repository": {"full_name": "festion/homelab-gitops-auditor"}}).to_string().into_bytes();
    let signature = sign("shared-secret", &body);

    let error = admission.admit("github", "push", Some(&signature), "delivery-1", &body).await.unwrap_err();
    assert_eq!(error.kind, gitaudit_core::ErrorKind::ValidationError);
}

#[tokio::test]
async fn an_oversized_body_is_rejected_before_signature_verification() {
    let (admission, _store) = harness();
    let body = vec![0u8; 10];

    let error = admission.admit("github", "push", None, "delivery-1", &body).await.unwrap_err();
    assert_eq!(error.kind, gitaudit_core::ErrorKind::PayloadTooLarge);
}

#[tokio::test]
async fn a_workflow_run_event_upserts_a_pipeline_run_without_touching_the_deployment_queue() {
    let (admission, store) = harness();
    let body = json!({
        "action": "completed",
        "workflow_run": {
            "id": 42,
            "name": "ci",
            "status": "completed",
            "conclusion": "success",
            "head_branch": "main",
            "head_sha": "deadbeef"
        },
        "repository": {"full_name": "festion/homelab-gitops-auditor"}
    })
    .to_string()
    .into_bytes();
    let signature = sign("shared-secret", &body);

    let outcome = admission.admit("github", "workflow_run", Some(&signature), "delivery-1", &body).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Accepted));

    let run = store.get_pipeline_run("festion/homelab-gitops-auditor", "42").await.unwrap().unwrap();
    assert_eq!(run.status, gitaudit_store::PipelineStatus::Success);

    let deployments = store.list_deployments(DeploymentFilter { status: None, repository: Some("festion/homelab-gitops-auditor".to_string()), limit: 10, offset: 0 }).await.unwrap();
    assert!(deployments.is_empty());
}
