//! Everything a handler needs, constructed once in `main` as values
//! rather than global singletons, and handed to every route as
//! `axum::extract::State`.

use std::sync::Arc;

use gitaudit_auth::AuthService;
use gitaudit_capabilities::{RemoteFS, RepoHost};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_eventbus::EventBus;
use gitaudit_metrics::MetricsAggregator;
use gitaudit_orchestrator::OrchestrationEngine;
use gitaudit_pipelines::PipelineSupervisor;
use gitaudit_store::Store;
use gitaudit_webhooks::WebhookAdmission;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub repo_host: Arc<dyn RepoHost>,
    pub remote_fs: Arc<dyn RemoteFS>,
    pub auth: Arc<AuthService>,
    pub metrics: Arc<MetricsAggregator>,
    pub pipelines: Arc<PipelineSupervisor>,
    pub deploy: Arc<DeploymentEngine>,
    pub orchestrator: Arc<OrchestrationEngine>,
    pub webhooks: Arc<WebhookAdmission>,
    pub events: Arc<EventBus>,
    pub metrics_handle: PrometheusHandle,
}
