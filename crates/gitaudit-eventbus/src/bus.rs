//! Room-scoped pub/sub. `EventBus` implements
//! `gitaudit_core::EventPublisher` so the rest of the workspace can publish through
//! it without depending on this crate directly. Room membership gates
//! on the same `Resource:Read` permission the Operator API checks for
//! that resource, per spec's "same `resource:read` permission as the
//! underlying API."

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gitaudit_core::{Action, DomainEvent, EventPublisher, GitopsError, GitopsResult, Permission, Resource, Role};

use crate::subscriber::Subscriber;
pub use crate::subscriber::BusMessage;

pub struct EventBus {
    rooms: RwLock<HashMap<String, Vec<Arc<Subscriber>>>>,
    default_capacity: usize,
}

#[derive(Debug)]
pub struct Subscription {
    room: String,
    subscriber: Arc<Subscriber>,
}

impl Subscription {
    pub fn room(&self) -> &str {
        &self.room
    }

    pub async fn recv(&self) -> Option<BusMessage> {
        self.subscriber.recv().await
    }
}

impl EventBus {
    /// `default_capacity` is the per-subscriber buffer size; the default
    /// is 256.
    pub fn new(default_capacity: usize) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), default_capacity }
    }

    pub fn subscribe(&self, room: &str, role: Role) -> GitopsResult<Subscription> {
        let resource = resource_for_room(room)?;
        if !role.allows(Permission::new(resource, Action::Read)) {
            return Err(GitopsError::policy_violation(format!("role does not have read access to room '{room}'")));
        }
        let subscriber = Arc::new(Subscriber::new(self.default_capacity));
        self.rooms.write().unwrap().entry(room.to_string()).or_default().push(subscriber.clone());
        Ok(Subscription { room: room.to_string(), subscriber })
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Some(subs) = self.rooms.write().unwrap().get_mut(&subscription.room) {
            subs.retain(|s| !Arc::ptr_eq(s, &subscription.subscriber));
        }
        subscription.subscriber.close();
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms.read().unwrap().get(room).map(Vec::len).unwrap_or(0)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: DomainEvent) {
        let rooms = self.rooms.read().unwrap();
        if let Some(subs) = rooms.get(&event.room) {
            for subscriber in subs {
                subscriber.push(event.clone());
            }
        }
    }
}

/// Rooms are `repo:<name>`, `pipeline:<name>`, `orchestration:<runId>`,
/// or the bare literal `system`. `Resource` has no `System` variant, so
/// the `system` room is gated on `Metrics:Read` as the closest existing
/// resource — both describe platform-wide state rather than a single
/// repository.
fn resource_for_room(room: &str) -> GitopsResult<Resource> {
    if room == "system" {
        return Ok(Resource::Metrics);
    }
    let prefix = room.split(':').next().unwrap_or(room);
    match prefix {
        "repo" => Ok(Resource::Repository),
        "pipeline" => Ok(Resource::Pipeline),
        "orchestration" => Ok(Resource::Orchestration),
        other => Err(GitopsError::validation(format!("unrecognized room '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn a_viewer_may_join_a_repo_room() {
        let bus = EventBus::new(16);
        assert!(bus.subscribe("repo:festion/homelab-gitops-auditor", Role::Viewer).is_ok());
    }

    #[test]
    fn a_viewer_cannot_join_an_orchestration_room() {
        let bus = EventBus::new(16);
        let error = bus.subscribe("orchestration:123", Role::Viewer).unwrap_err();
        assert_eq!(error.kind, gitaudit_core::ErrorKind::PolicyViolation);
    }

    #[test]
    fn an_unrecognized_room_prefix_is_a_validation_error() {
        let bus = EventBus::new(16);
        let error = bus.subscribe("bogus:anything", Role::Admin).unwrap_err();
        assert_eq!(error.kind, gitaudit_core::ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn publish_only_reaches_subscribers_of_that_room() {
        let bus = EventBus::new(16);
        let repo_sub = bus.subscribe("repo:a", Role::Viewer).unwrap();
        let other_sub = bus.subscribe("repo:b", Role::Viewer).unwrap();

        bus.publish(DomainEvent::new("repo:a", "deployment:started", json!({})));

        let message = repo_sub.recv().await.unwrap();
        assert!(matches!(message, BusMessage::Event(e) if e.room == "repo:a"));
        assert_eq!(bus.subscriber_count("repo:b"), 1);
        drop(other_sub);
    }

    #[test]
    fn unsubscribe_removes_the_subscriber_from_the_room() {
        let bus = EventBus::new(16);
        let sub = bus.subscribe("repo:a", Role::Viewer).unwrap();
        assert_eq!(bus.subscriber_count("repo:a"), 1);
        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count("repo:a"), 0);
    }
}
