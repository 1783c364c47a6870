pub mod auth;
pub mod compliance;
pub mod deployments;
pub mod health;
pub mod pipelines;
pub mod realtime;
pub mod webhooks;

use chrono::Utc;
use gitaudit_core::{Action, GitopsError, Permission, Resource};
use gitaudit_store::AuditLogEntry;
use uuid::Uuid;

use crate::auth_middleware::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Every handler that isn't a plain read calls this before touching a
/// component; a role matches the exact resource/action pair or the
/// wildcard `*:*`.
pub fn require(user: &AuthenticatedUser, resource: Resource, action: Action) -> Result<(), ApiError> {
    if user.role.allows(Permission::new(resource, action)) {
        Ok(())
    } else {
        Err(GitopsError::policy_violation(format!("role does not grant {resource:?}:{action:?}")).into())
    }
}

/// Every state-changing operator call records one of these, regardless
/// of which component ends up handling the write; failures to persist
/// the entry are logged, not propagated, so a store hiccup never turns
/// an otherwise-successful operator action into a 500.
pub async fn audit(state: &AppState, actor: &str, action: &str, entity: &str, entity_id: &str, detail: serde_json::Value) {
    let entry = AuditLogEntry { id: Uuid::new_v4(), actor: actor.to_string(), action: action.to_string(), entity: entity.to_string(), entity_id: entity_id.to_string(), detail, at: Utc::now() };
    if let Err(error) = state.store.append_audit_entry(entry).await {
        tracing::warn!(%error, actor, action, entity, entity_id, "failed to persist audit entry");
    }
}
