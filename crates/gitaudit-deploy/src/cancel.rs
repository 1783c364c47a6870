//! In-process cancel-flag registry. A `queued` deployment is cancelled by
//! a direct store transition; an `in-progress` one is cancelled by
//! flipping a flag the worker checks between protocol steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

#[derive(Default)]
pub struct CancelRegistry {
    flags: RwLock<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once by the worker when it starts processing a claimed row.
    pub fn register(&self, id: Uuid) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.flags.write().unwrap().insert(id, flag.clone());
        flag
    }

    /// Called by the cancel API handler; a no-op if the deployment isn't
    /// currently owned by a worker (it may still be `queued`, handled by
    /// a direct store transition instead).
    pub fn request(&self, id: Uuid) {
        if let Some(flag) = self.flags.read().unwrap().get(&id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn forget(&self, id: Uuid) {
        self.flags.write().unwrap().remove(&id);
    }
}

pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
