//! Real-Time Event Bus: room-scoped pub/sub with
//! per-subscriber bounded buffers, drop-oldest overflow, and
//! permission-gated room membership. Implements
//! `gitaudit_core::EventPublisher` so every other component can publish
//! through a single `Arc<dyn EventPublisher>` without depending on this
//! crate.

mod bus;
mod subscriber;

pub use bus::{EventBus, Subscription};
pub use subscriber::BusMessage;
