//! Webhook Admission Pipeline: authenticates,
//! deduplicates, validates, and dispatches inbound `push`,
//! `pull_request`, `workflow_run`, and `repository_dispatch` events.
//! Dedup and rate-limiting are delegated to the primitives gitaudit-core
//! and the store already expose (`Store::record_webhook_delivery`,
//! `gitaudit_core::RateLimiterRegistry`) rather than reimplemented here.

pub mod admission;
pub mod dispatch;
pub mod schema;
pub mod signature;

pub use admission::{AdmissionOutcome, WebhookAdmission};
