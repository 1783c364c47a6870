//! Composition root: every component is a value constructed here and
//! passed explicitly, wired through `AppState`; nothing reaches for a
//! process-wide static.

use std::sync::Arc;

use gitaudit_auth::AuthService;
use gitaudit_capabilities::{CircuitBreaker, CircuitBreakerConfig, ProcessRemoteFS, ProcessRepoHost};
use gitaudit_core::RateLimiterRegistry;
use gitaudit_deploy::health::ReqwestHealthChecker;
use gitaudit_deploy::DeploymentEngine;
use gitaudit_eventbus::EventBus;
use gitaudit_metrics::MetricsAggregator;
use gitaudit_orchestrator::OrchestrationEngine;
use gitaudit_pipelines::{PipelineSupervisor, ProcessCodeHost};
use gitaudit_store::{InMemoryStore, MigrationRunner, PgStore, Store};
use gitaudit_webhooks::WebhookAdmission;

use gitaudit_server::{router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gitaudit_core::init_tracing();
    let metrics_handle = gitaudit_server::telemetry::install_recorder();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(bind_addr = %config.bind_addr, "starting gitaudit-server");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let connection = gitaudit_store::DbConnection::connect(database_url, 10).await?;
            let runner = MigrationRunner::new(connection.pool());
            runner.init().await?;
            runner.migrate().await?;
            Arc::new(PgStore::new(connection.pool().clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running against an in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let repo_host_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let remote_fs_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let repo_host = Arc::new(ProcessRepoHost::new(config.repo_host_tool_path.clone(), repo_host_breaker));
    let remote_fs = Arc::new(ProcessRemoteFS::new(config.remote_fs_tool_path.clone(), remote_fs_breaker));

    let events = Arc::new(EventBus::new(config.eventbus_subscriber_capacity));

    let auth = Arc::new(AuthService::new(store.clone()));
    let metrics = Arc::new(MetricsAggregator::new(store.clone()));

    let code_host_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let code_host = Arc::new(ProcessCodeHost::new(config.repo_host_tool_path.clone(), code_host_breaker));
    let pipelines = Arc::new(PipelineSupervisor::new(store.clone(), code_host, events.clone()));

    let health_checker = Arc::new(ReqwestHealthChecker::default());
    let deploy = Arc::new(DeploymentEngine::new(
        store.clone(),
        repo_host.clone(),
        remote_fs.clone(),
        health_checker,
        events.clone(),
    ));
    let worker_handles = deploy.clone().spawn_pool(config.workers_deployment_pool);
    tracing::info!(count = worker_handles.len(), "deployment worker pool started");

    let orchestrator = Arc::new(OrchestrationEngine::new(store.clone(), deploy.clone(), events.clone()));

    let rate_limiter = Arc::new(RateLimiterRegistry::new(60, 60));
    let webhooks = Arc::new(WebhookAdmission::new(
        store.clone(),
        deploy.clone(),
        config.webhook_secrets.clone(),
        rate_limiter,
        config.limits_webhook_dedup_ttl_seconds,
        config.limits_max_content_bytes,
    ));

    let app_state = AppState {
        config: config.clone(),
        store,
        repo_host,
        remote_fs,
        auth,
        metrics,
        pipelines,
        deploy,
        orchestrator,
        webhooks,
        events,
        metrics_handle,
    };

    let app = router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}
