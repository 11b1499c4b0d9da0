use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as SlotMutex, OwnedMutexGuard};

use crate::id::SagaId;

type Slot = Arc<SlotMutex<()>>;

/// Registry of per-saga locks, keyed by saga id.
///
/// A run holds its saga's [`SagaGuard`] for its whole duration, so two runs of
/// the same saga never overlap within one registry. Slots are removed once no
/// guard refers to them. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct SagaLocks {
    slots: Arc<Mutex<HashMap<SagaId, Slot>>>,
}

impl SagaLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id` if nobody holds it.
    #[must_use]
    pub fn try_lock(&self, id: SagaId) -> Option<SagaGuard> {
        let slot = Arc::clone(self.slots.lock().entry(id).or_default());
        match slot.try_lock_owned() {
            Ok(guard) => Some(SagaGuard {
                id,
                guard: Some(guard),
                locks: self.clone(),
            }),
            Err(_) => {
                self.prune(id);
                None
            }
        }
    }

    #[must_use]
    pub fn is_locked(&self, id: SagaId) -> bool {
        self.slots
            .lock()
            .get(&id)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Number of sagas currently holding a slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, id: SagaId) {
        let mut slots = self.slots.lock();
        if slots.get(&id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&id);
        }
    }
}

/// Exclusive hold on one saga id; released on drop.
#[derive(Debug)]
pub struct SagaGuard {
    id: SagaId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: SagaLocks,
}

impl SagaGuard {
    #[must_use]
    pub fn id(&self) -> SagaId {
        self.id
    }
}

impl Drop for SagaGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.id);
    }
}
