//! Admission pipeline entry point: size guard, throttle, signature,
//! dedup, schema, dispatch — in that order, so the cheapest rejections
//! (size, rate) never pay for an HMAC computation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gitaudit_core::{GitopsError, GitopsResult, RateLimiterRegistry};
use gitaudit_deploy::DeploymentEngine;
use gitaudit_store::{AuditLogEntry, Store};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{dispatch, schema, signature};

#[derive(Debug)]
pub enum AdmissionOutcome {
    Accepted,
    Duplicate,
}

pub struct WebhookAdmission {
    store: Arc<dyn Store>,
    deploy: Arc<DeploymentEngine>,
    secrets: HashMap<String, String>,
    rate_limiter: Arc<RateLimiterRegistry>,
    dedup_ttl_seconds: u64,
    max_body_bytes: u64,
}

impl WebhookAdmission {
    pub fn new(
        store: Arc<dyn Store>,
        deploy: Arc<DeploymentEngine>,
        secrets: HashMap<String, String>,
        rate_limiter: Arc<RateLimiterRegistry>,
        dedup_ttl_seconds: u64,
        max_body_bytes: u64,
    ) -> Self {
        Self { store, deploy, secrets, rate_limiter, dedup_ttl_seconds, max_body_bytes }
    }

    pub async fn admit(&self, host: &str, event_type: &str, signature_header: Option<&str>, delivery_id: &str, body: &[u8]) -> GitopsResult<AdmissionOutcome> {
        if body.len() as u64 > self.max_body_bytes {
            return Err(GitopsError::payload_too_large(self.max_body_bytes));
        }
        if !self.rate_limiter.try_acquire(host).await {
            return Err(GitopsError::rate_limited(60));
        }

        let secret = self.secrets.get(host).ok_or_else(|| GitopsError::auth_failed(format!("no webhook secret configured for host '{host}'")))?;
        let signature_header = signature_header.ok_or_else(|| GitopsError::auth_failed("missing signature header"))?;
        signature::verify(secret, body, signature_header)?;

        let is_new = self.store.record_webhook_delivery(host, delivery_id, self.dedup_ttl_seconds, Utc::now()).await?;
        if !is_new {
            self.audit(host, delivery_id, event_type, "webhook.duplicate", true).await;
            return Ok(AdmissionOutcome::Duplicate);
        }

        let payload: Value = serde_json::from_slice(body).map_err(|error| GitopsError::validation(format!("webhook body is not valid json: {error}")))?;
        schema::validate(event_type, &payload)?;
        dispatch::dispatch(&self.store, &self.deploy, host, event_type, &payload).await?;
        self.audit(host, delivery_id, event_type, "webhook.received", false).await;
        Ok(AdmissionOutcome::Accepted)
    }

    async fn audit(&self, host: &str, delivery_id: &str, event_type: &str, action: &str, duplicate: bool) {
        let _ = self
            .store
            .append_audit_entry(AuditLogEntry {
                id: Uuid::new_v4(),
                actor: format!("webhook:{host}"),
                action: action.to_string(),
                entity: "webhook".to_string(),
                entity_id: delivery_id.to_string(),
                detail: json!({"eventType": event_type, "duplicate": duplicate}),
                at: Utc::now(),
            })
            .await;
    }
}
