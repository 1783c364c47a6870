use axum::extract::State;
use axum::Json;
use gitaudit_store::StoreHealth;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub components: Vec<ComponentHealth>,
    pub store: StoreHealthView,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: &'static str,
    pub detail: Option<String>,
}

#[derive(Serialize)]
pub struct StoreHealthView {
    pub queued: i64,
    #[serde(rename = "inProgress")]
    pub in_progress: i64,
    pub terminal: i64,
}

/// No auth gate: an operator dashboard polls this before it has a
/// session, and a load balancer health probe never will. `status` is a
/// tri-state (`ok`/`degraded`/`down`), not a bare bool: a single `down`
/// component sinks the whole snapshot, anything else short of all-`ok`
/// is `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    let (store_status, store_health) = match state.store.health_check().await {
        Ok(health) => ("ok", health),
        Err(error) => {
            tracing::warn!(%error, "store health check failed");
            ("down", StoreHealth::default())
        }
    };
    let store_component = ComponentHealth { name: "store", status: store_status, detail: None };

    let deployment_pool = ComponentHealth {
        name: "deploymentPool",
        status: "ok",
        detail: Some(format!("{} worker(s) configured", state.config.workers_deployment_pool)),
    };

    let eventbus_component = ComponentHealth {
        name: "eventbus",
        status: "ok",
        detail: Some(format!("{} subscriber(s) on system room", state.events.subscriber_count("system"))),
    };

    let components = vec![store_component, deployment_pool, eventbus_component];
    let status = if components.iter().any(|c| c.status == "down") {
        "down"
    } else if components.iter().all(|c| c.status == "ok") {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthSnapshot {
        status,
        components,
        store: StoreHealthView { queued: store_health.queued, in_progress: store_health.in_progress, terminal: store_health.terminal },
    })
}
