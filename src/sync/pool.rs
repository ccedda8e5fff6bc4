use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters. The slot is dropped from the map when this reaches zero.
    users: usize,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Process-wide table of per-key exclusive slots.
///
/// `check_in(key)` waits until no other task holds `key`. The returned guard
/// checks the key back out when dropped. Distinct keys never contend. Not
/// re-entrant: checking in the same key twice from one task deadlocks.
#[derive(Clone, Default)]
pub struct ExclusivePool {
    slots: Slots,
}

impl ExclusivePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check_in(&self, key: impl Into<String>) -> PoolGuard {
        let key = key.into();
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        // Registered before awaiting so a cancelled wait still releases its count.
        let registration = Registration {
            slots: Arc::clone(&self.slots),
            key,
        };
        let held = lock.lock_owned().await;
        tracing::trace!(key = %registration.key, "checked in");
        PoolGuard {
            _held: held,
            registration,
        }
    }

    /// Returns true if some task currently holds or waits for `key`.
    pub fn is_checked_in(&self, key: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.contains_key(key)
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Registration {
    slots: Slots,
    key: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Holds a key of an [`ExclusivePool`] until dropped.
pub struct PoolGuard {
    // Field order matters: the mutex is released before the registration count drops.
    _held: OwnedMutexGuard<()>,
    registration: Registration,
}

impl PoolGuard {
    pub fn key(&self) -> &str {
        &self.registration.key
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        tracing::trace!(key = %self.registration.key, "checked out");
    }
}
