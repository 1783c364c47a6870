use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use gitaudit_capabilities::{Branch, Commit, FileContent, FileInfo, PullRequest, RemoteFS, RepoHost};
use gitaudit_core::{EventPublisher, GitopsError, GitopsResult, NoopEventPublisher};
use gitaudit_deploy::health::{HealthChecker, HealthResponse};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_orchestrator::{ActionSpec, OrchestrationEngine};
use gitaudit_store::{
    InMemoryStore, OrchestrationProfile, OrchestrationStage, OrchestrationState, RepositorySelector, StageExecution, Store,
};
use serde_json::json;

struct FakeRepoHost {
    fail_for: HashSet<String>,
}

#[async_trait::async_trait]
impl RepoHost for FakeRepoHost {
    async fn get_file(&self, _owner: &str, _repo: &str, _path: &str, _git_ref: Option<&str>) -> GitopsResult<FileContent> {
        Ok(FileContent { content: "homeassistant:\n  name: home\n".to_string(), sha: "sha".to_string() })
    }
    async fn put_file(
        &self,
        _owner: &str,
        _repo: &str,
        _path: &str,
        _content: &[u8],
        _message: &str,
        _branch: &str,
        _sha: Option<&str>,
    ) -> GitopsResult<gitaudit_capabilities::CommitRef> {
        unimplemented!()
    }
    async fn list_branches(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<Branch>> {
        Ok(vec![])
    }
    async fn list_commits(&self, owner: &str, repo: &str, _branch: &str) -> GitopsResult<Vec<Commit>> {
        if self.fail_for.contains(&format!("{owner}/{repo}")) {
            return Err(GitopsError::transport("simulated repo host outage"));
        }
        Ok(vec![Commit { sha: "deadbeef".to_string(), message: "msg".to_string(), author: "someone".to_string() }])
    }
    async fn create_branch(&self, _owner: &str, _repo: &str, _name: &str, _from_sha: &str) -> GitopsResult<Branch> {
        unimplemented!()
    }
    async fn list_tags(&self, _owner: &str, _repo: &str) -> GitopsResult<Vec<String>> {
        Ok(vec![])
    }
    async fn create_pull_request(
        &self,
        _owner: &str,
        _repo: &str,
        _title: &str,
        _head: &str,
        _base: &str,
    ) -> GitopsResult<PullRequest> {
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
        self.files
            .lock()
            .unwrap()
            .get(&(share.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| GitopsError::not_found(format!("{share}/{path} not found")))
    }
    async fn list(&self, _share: &str, _path: &str) -> GitopsResult<Vec<FileInfo>> {
        Ok(vec![])
    }
    async fn delete(&self, share: &str, path: &str) -> GitopsResult<()> {
        self.files.lock().unwrap().remove(&(share.to_string(), path.to_string()));
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

fn engines(fail_for: HashSet<String>) -> (Arc<OrchestrationEngine>, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let events: Arc<dyn EventPublisher> = Arc::new(NoopEventPublisher);
    let deploy = Arc::new(DeploymentEngine::new(
        store.clone(),
        Arc::new(FakeRepoHost { fail_for }),
        Arc::new(FakeRemoteFS::default()),
        Arc::new(AlwaysHealthy),
        events.clone(),
    ));
    let orchestrator = Arc::new(OrchestrationEngine::new(store.clone(), deploy, events));
    (orchestrator, store)
}

fn action(id: &str, repository: &str) -> ActionSpec {
    ActionSpec { id: id.to_string(), repository: repository.to_string(), branch: "main".to_string(), commit: String::new(), parameters: json!({}) }
}

#[tokio::test]
async fn sequential_stage_with_no_failures_completes() {
    let (orchestrator, _store) = engines(HashSet::new());

    let profile = OrchestrationProfile {
        name: "rollout".to_string(),
        selector: RepositorySelector::All,
        stages: vec![OrchestrationStage {
            name: "deploy".to_string(),
            execution: StageExecution::Sequential,
            actions: vec!["a".to_string(), "b".to_string()],
            dependencies: HashMap::new(),
        }],
        timeout_seconds: 0,
        max_retries: 3,
        rollback_on_failure: false,
        critical_failure_threshold: 0.5,
        notifications: vec![],
    };
    let actions = vec![action("a", "festion/a"), action("b", "festion/b")];

    let run = orchestrator.run(profile, actions).await.unwrap();
    assert_eq!(run.state, OrchestrationState::Completed);
    assert_eq!(run.completed_actions.as_array().unwrap().len(), 2);
    assert!(run.failed_actions.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn exceeding_the_threshold_fails_and_rolls_back_completed_actions() {
    let mut fail_for = HashSet::new();
    fail_for.insert("festion/b".to_string());
    let (orchestrator, _store) = engines(fail_for);

    let profile = OrchestrationProfile {
        name: "rollout".to_string(),
        selector: RepositorySelector::All,
        stages: vec![OrchestrationStage {
            name: "deploy".to_string(),
            execution: StageExecution::Parallel,
            actions: vec!["a".to_string(), "b".to_string()],
            dependencies: HashMap::new(),
        }],
        timeout_seconds: 0,
        max_retries: 3,
        rollback_on_failure: true,
        critical_failure_threshold: 0.3,
        notifications: vec![],
    };
    let actions = vec![action("a", "festion/a"), action("b", "festion/b")];

    let run = orchestrator.run(profile, actions).await.unwrap();
    assert_eq!(run.state, OrchestrationState::RolledBack);
    assert_eq!(run.completed_actions.as_array().unwrap().len(), 1);
    assert_eq!(run.failed_actions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn dependency_ordered_stage_skips_descendants_of_a_failed_action() {
    let mut fail_for = HashSet::new();
    fail_for.insert("festion/a".to_string());
    let (orchestrator, _store) = engines(fail_for);

    let mut dependencies = HashMap::new();
    dependencies.insert("b".to_string(), vec!["a".to_string()]);

    let profile = OrchestrationProfile {
        name: "rollout".to_string(),
        selector: RepositorySelector::All,
        stages: vec![OrchestrationStage {
            name: "deploy".to_string(),
            execution: StageExecution::DependencyOrdered,
            actions: vec!["a".to_string(), "b".to_string()],
            dependencies,
        }],
        timeout_seconds: 0,
        max_retries: 3,
        rollback_on_failure: false,
        critical_failure_threshold: 1.0,
        notifications: vec![],
    };
    let actions = vec![action("a", "festion/a"), action("b", "festion/b")];

    let run = orchestrator.run(profile, actions).await.unwrap();
    assert_eq!(run.completed_actions.as_array().unwrap().len(), 0);
    assert_eq!(run.failed_actions.as_array().unwrap().len(), 2);
}
