use std::sync::Arc;

use uuid::Uuid;

/// Identifier generation behind a trait so tests can inject sequential ids.
/// Deployment ids are UUID v4, generated here rather than by the database.
pub trait IdGen: Send + Sync {
    fn new_uuid_v4(&self) -> Uuid;
}

#[derive(Debug, Default)]
pub struct UuidV4Gen;

impl UuidV4Gen {
    pub fn new() -> Arc<dyn IdGen> {
        Arc::new(Self)
    }
}

impl IdGen for UuidV4Gen {
    fn new_uuid_v4(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic generator for tests: hands out ids from a fixed sequence,
/// falling back to fresh v4s once exhausted.
pub struct SequentialIdGen {
    seq: std::sync::Mutex<std::collections::VecDeque<Uuid>>,
}

impl SequentialIdGen {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Arc<Self> {
        Arc::new(Self { seq: std::sync::Mutex::new(ids.into_iter().collect()) })
    }
}

impl IdGen for SequentialIdGen {
    fn new_uuid_v4(&self) -> Uuid {
        self.seq.lock().unwrap().pop_front().unwrap_or_else(Uuid::new_v4)
    }
}
