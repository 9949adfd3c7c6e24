//! Per-key mutexes serializing work on one stock item or one encounter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per key, created on demand and dropped once unused.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Calls with the same key run one at a time; different keys do not
    /// block each other. A panic inside `f` does not wedge the key.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        self.prune(key, slot);
        result
    }

    /// Drop the slot if no other caller holds or waits on it.
    fn prune(&self, key: &str, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }

    /// Keys currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock registry shared by every engine entry point.
///
/// Acquisition order is always encounter first, then stock item.
#[derive(Default)]
pub struct LockRegistry {
    encounters: KeyedLocks,
    items: KeyedLocks,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encounter<T>(&self, encounter_id: &str, f: impl FnOnce() -> T) -> T {
        self.encounters.with_lock(encounter_id, f)
    }

    pub fn with_item<T>(&self, item_id: &str, f: impl FnOnce() -> T) -> T {
        self.items.with_lock(item_id, f)
    }

    /// Encounter lock, then item lock, then `f`.
    pub fn with_encounter_and_item<T>(
        &self,
        encounter_id: &str,
        item_id: &str,
        f: impl FnOnce() -> T,
    ) -> T {
        self.with_encounter(encounter_id, || self.with_item(item_id, f))
    }
}
