//! Orchestration Planner: expands an
//! `OrchestrationProfile` into stages of actions and drives each action
//! through the Deployment Engine, honoring each stage's execution
//! mode, the profile's `criticalFailureThreshold`, `rollbackOnFailure`,
//! and `timeoutSeconds`. Shares `gitaudit-deploy`'s worker-loop shape —
//! this crate owns the staging/threshold/timeout logic on top of it
//! rather than duplicating deployment bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use gitaudit_core::{DomainEvent, EventPublisher, GitopsError, GitopsResult};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_store::{
    DeploymentState, OrchestrationProfile, OrchestrationRun, OrchestrationState, Priority, StageExecution, Store,
};
use serde_json::json;
use uuid::Uuid;

use crate::graph;
use crate::types::ActionSpec;

pub fn room_for(run_id: Uuid) -> String {
    format!("orchestration:{run_id}")
}

pub struct OrchestrationEngine {
    store: Arc<dyn Store>,
    deploy: Arc<DeploymentEngine>,
    events: Arc<dyn EventPublisher>,
}

struct ActionResult {
    action_id: String,
    deployment_id: Uuid,
    success: bool,
}

impl OrchestrationEngine {
    pub fn new(store: Arc<dyn Store>, deploy: Arc<DeploymentEngine>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, deploy, events }
    }

    fn emit(&self, run_id: Uuid, kind: &str, payload: serde_json::Value) {
        self.events.publish(DomainEvent::new(room_for(run_id), format!("orchestration:{kind}"), payload));
    }

    /// Runs one profile to completion (or failure). `actions` is the
    /// already-expanded action list — repository selection against the
    /// current inventory happens before this call, via
    /// `types::select_repositories`.
    pub async fn run(&self, profile: OrchestrationProfile, actions: Vec<ActionSpec>) -> GitopsResult<OrchestrationRun> {
        let id = Uuid::new_v4();
        let action_map: HashMap<String, ActionSpec> = actions.into_iter().map(|a| (a.id.clone(), a)).collect();

        let mut run = OrchestrationRun {
            id,
            profile_name: profile.name.clone(),
            state: OrchestrationState::Running,
            started_at: Utc::now(),
            completed_at: None,
            completed_actions: json!([]),
            failed_actions: json!([]),
        };
        self.store.insert_orchestration_run(run.clone()).await?;
        self.emit(id, "started", json!({"profile": profile.name}));

        let in_flight: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(Vec::new()));
        let mut completed: Vec<ActionResult> = Vec::new();
        let mut failed: Vec<ActionResult> = Vec::new();
        let mut skipped_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut timed_out = false;

        let body = self.run_stages(&profile, &action_map, &in_flight, &mut completed, &mut failed, &mut skipped_ids);

        if profile.timeout_seconds > 0 {
            match tokio::time::timeout(Duration::from_secs(profile.timeout_seconds), body).await {
                Ok(result) => result?,
                Err(_) => timed_out = true,
            }
        } else {
            body.await?;
        }

        if timed_out {
            let stranded: Vec<Uuid> = in_flight.lock().unwrap().clone();
            for deployment_id in stranded {
                let _ = self.deploy.cancel(deployment_id).await;
            }
            self.emit(id, "timeout", json!({}));
        }

        let threshold_exceeded = exceeds_threshold(completed.len(), failed.len(), profile.critical_failure_threshold);
        let mut rolled_back = false;

        if timed_out || threshold_exceeded {
            if profile.rollback_on_failure {
                for result in completed.iter().rev() {
                    match self.deploy.rollback_deployment(result.deployment_id, "orchestration rollback").await {
                        Ok(_) => rolled_back = true,
                        Err(error) => tracing::warn!(%error, action = %result.action_id, "orchestration rollback step failed"),
                    }
                }
            }
            run.state = if rolled_back { OrchestrationState::RolledBack } else { OrchestrationState::Failed };
        } else {
            run.state = OrchestrationState::Completed;
        }

        run.completed_at = Some(Utc::now());
        run.completed_actions = json!(completed.iter().map(|r| json!({"actionId": r.action_id, "deploymentId": r.deployment_id})).collect::<Vec<_>>());
        run.failed_actions = json!(failed.iter().map(|r| json!({"actionId": r.action_id, "deploymentId": r.deployment_id})).collect::<Vec<_>>());

        self.store.update_orchestration_run(run.clone()).await?;
        self.emit(id, "finished", json!({"state": format!("{:?}", run.state)}));
        Ok(run)
    }

    async fn run_stages(
        &self,
        profile: &OrchestrationProfile,
        action_map: &HashMap<String, ActionSpec>,
        in_flight: &Arc<Mutex<Vec<Uuid>>>,
        completed: &mut Vec<ActionResult>,
        failed: &mut Vec<ActionResult>,
        skipped_ids: &mut std::collections::HashSet<String>,
    ) -> GitopsResult<()> {
        for stage in &profile.stages {
            match stage.execution {
                StageExecution::Sequential => {
                    for action_id in &stage.actions {
                        if skipped_ids.contains(action_id) {
                            continue;
                        }
                        let action = action_map
                            .get(action_id)
                            .ok_or_else(|| GitopsError::validation(format!("stage '{}' names unknown action '{action_id}'", stage.name)))?;
                        let result = self.run_action(action, in_flight).await;
                        let stop = !result.success;
                        if result.success { completed.push(result) } else { failed.push(result) }
                        if stop {
                            break;
                        }
                    }
                }
                StageExecution::Parallel => {
                    let runnable: Vec<&ActionSpec> = stage
                        .actions
                        .iter()
                        .filter(|id| !skipped_ids.contains(*id))
                        .map(|id| {
                            action_map.get(id).ok_or_else(|| GitopsError::validation(format!("stage '{}' names unknown action '{id}'", stage.name)))
                        })
                        .collect::<GitopsResult<Vec<_>>>()?;
                    let results = futures::future::join_all(runnable.iter().map(|action| self.run_action(action, in_flight))).await;
                    for result in results {
                        if result.success { completed.push(result) } else { failed.push(result) }
                    }
                }
                StageExecution::DependencyOrdered => {
                    let layers = graph::layer_order(&stage.actions, &stage.dependencies)?;
                    for layer in layers {
                        let mut runnable = Vec::new();
                        for action_id in &layer {
                            let deps = stage.dependencies.get(action_id).cloned().unwrap_or_default();
                            if skipped_ids.contains(action_id) {
                                continue;
                            }
                            if deps.iter().any(|d| skipped_ids.contains(d)) {
                                skipped_ids.insert(action_id.clone());
                                failed.push(ActionResult { action_id: action_id.clone(), deployment_id: Uuid::nil(), success: false });
                                continue;
                            }
                            let action = action_map
                                .get(action_id)
                                .ok_or_else(|| GitopsError::validation(format!("stage '{}' names unknown action '{action_id}'", stage.name)))?;
                            runnable.push(action);
                        }
                        let results = futures::future::join_all(runnable.iter().map(|action| self.run_action(action, in_flight))).await;
                        for result in results {
                            if !result.success {
                                skipped_ids.insert(result.action_id.clone());
                                failed.push(result);
                            } else {
                                completed.push(result);
                            }
                        }
                    }
                }
            }

            if exceeds_threshold(completed.len(), failed.len(), profile.critical_failure_threshold) {
                break;
            }
        }
        Ok(())
    }

    async fn run_action(&self, action: &ActionSpec, in_flight: &Arc<Mutex<Vec<Uuid>>>) -> ActionResult {
        let submitted = self
            .deploy
            .submit(&action.repository, &action.branch, &action.commit, Priority::Normal, "orchestrator", action.parameters.clone())
            .await;

        let Ok(deployment_id) = submitted else {
            return ActionResult { action_id: action.id.clone(), deployment_id: Uuid::nil(), success: false };
        };

        in_flight.lock().unwrap().push(deployment_id);
        let worker_id = format!("orchestrator-{}", action.id);
        let outcome = self.deploy.run_specific(deployment_id, &worker_id).await;
        in_flight.lock().unwrap().retain(|id| *id != deployment_id);

        let success = matches!(outcome, Ok(deployment) if deployment.state == DeploymentState::Completed);
        ActionResult { action_id: action.id.clone(), deployment_id, success }
    }
}

/// `attempted == 0` (nothing has run yet) never trips the threshold.
fn exceeds_threshold(completed_count: usize, failed_count: usize, threshold: f64) -> bool {
    let attempted = completed_count + failed_count;
    if attempted == 0 {
        return false;
    }
    (failed_count as f64 / attempted as f64) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_failures_never_exceed_the_threshold() {
        assert!(!exceeds_threshold(5, 0, 0.0));
    }

    #[test]
    fn half_failures_exceed_a_quarter_threshold() {
        assert!(exceeds_threshold(1, 1, 0.25));
    }

    #[test]
    fn no_attempts_yet_never_exceed_the_threshold() {
        assert!(!exceeds_threshold(0, 0, 0.0));
    }
}
