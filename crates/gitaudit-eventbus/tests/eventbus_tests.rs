use gitaudit_core::{DomainEvent, EventPublisher, Role};
use gitaudit_eventbus::{BusMessage, EventBus};
use serde_json::json;

#[tokio::test]
async fn a_published_event_fans_out_to_every_subscriber_of_its_room() {
    let bus = EventBus::new(16);
    let first = bus.subscribe("pipeline:ci", Role::Viewer).unwrap();
    let second = bus.subscribe("pipeline:ci", Role::Operator).unwrap();

    bus.publish(DomainEvent::new("pipeline:ci", "pipeline:completed", json!({"status": "success"})));

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert!(matches!(a, BusMessage::Event(e) if e.kind == "pipeline:completed"));
    assert!(matches!(b, BusMessage::Event(e) if e.kind == "pipeline:completed"));
}

#[tokio::test]
async fn a_slow_subscriber_sees_a_dropped_marker_instead_of_blocking_the_publisher() {
    let bus = EventBus::new(2);
    let subscription = bus.subscribe("repo:festion/homelab-gitops-auditor", Role::Viewer).unwrap();

    for i in 0..5 {
        bus.publish(DomainEvent::new("repo:festion/homelab-gitops-auditor", format!("tick-{i}"), json!({})));
    }

    let first = subscription.recv().await.unwrap();
    assert!(matches!(first, BusMessage::Dropped(3)));
    let second = subscription.recv().await.unwrap();
    assert!(matches!(second, BusMessage::Event(e) if e.kind == "tick-3"));
    let third = subscription.recv().await.unwrap();
    assert!(matches!(third, BusMessage::Event(e) if e.kind == "tick-4"));
}

#[tokio::test]
async fn events_published_to_one_room_never_reach_another() {
    let bus = EventBus::new(16);
    let repo_sub = bus.subscribe("repo:festion/homelab-gitops-auditor", Role::Viewer).unwrap();
    let _system_sub = bus.subscribe("system", Role::Viewer).unwrap();

    bus.publish(DomainEvent::new("system", "heartbeat", json!({})));
    bus.unsubscribe(&repo_sub);

    assert_eq!(bus.subscriber_count("repo:festion/homelab-gitops-auditor"), 0);
    assert_eq!(bus.subscriber_count("system"), 1);
}
