//! One subscriber's bounded buffer: a drop-oldest ring buffer, in place
//! of `tokio::sync::broadcast`'s lag-as-error semantics, that surfaces a
//! gap as a message in the stream itself instead of an error the caller
//! must handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use gitaudit_core::DomainEvent;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum BusMessage {
    Event(DomainEvent),
    /// At least `count` events were dropped before this point in the
    /// stream; the client should invalidate caches for the room.
    Dropped(u64),
}

#[derive(Debug)]
pub(crate) struct Subscriber {
    queue: Mutex<VecDeque<BusMessage>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::with_capacity(capacity)), capacity: capacity.max(1), notify: Notify::new(), closed: AtomicBool::new(false) }
    }

    pub(crate) fn push(&self, event: DomainEvent) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            queue.pop_front();
            match queue.front_mut() {
                Some(BusMessage::Dropped(count)) => *count += 1,
                _ => queue.push_front(BusMessage::Dropped(1)),
            }
        }
        queue.push_back(BusMessage::Event(event));
        drop(queue);
        self.notify.notify_one();
    }

    pub(crate) async fn recv(&self) -> Option<BusMessage> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().unwrap();
                if let Some(message) = queue.pop_front() {
                    return Some(message);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
