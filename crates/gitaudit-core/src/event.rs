//! The push contract every component publishes through (spec component
//! The eventbus crate owns the actual bus; this crate only owns the trait, so other components
//! can depend on the contract without depending on the bus implementation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub room: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(room: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { room: room.into(), kind: kind.into(), payload, at: Utc::now() }
    }
}

/// Best-effort publish: a full subscriber buffer drops the oldest entry
/// rather than blocking the publisher, so this never returns an error the
/// caller needs to act on.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Wiring default for call sites that don't yet have a bus attached (unit
/// tests, or components exercised outside `gitaudit-server`).
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: DomainEvent) {}
}
