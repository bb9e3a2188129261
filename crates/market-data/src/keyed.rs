//! Per-key locking used by the breaker, spacer and cache.
//!
//! Each key owns its own mutex so that unrelated sources or symbols never
//! contend. The index itself is an `RwLock` that is only write-locked when a
//! key is first seen or removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::warn;

pub(crate) struct KeyedSlots<V> {
    name: &'static str,
    slots: RwLock<HashMap<String, Arc<Mutex<V>>>>,
}

impl<V> KeyedSlots<V> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Mutex<V>>>> {
        self.slots.read().unwrap_or_else(|poisoned| {
            warn!("{} index lock was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<V>>>> {
        self.slots.write().unwrap_or_else(|poisoned| {
            warn!("{} index lock was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Lock a single slot, recovering from poison if necessary.
    pub(crate) fn lock<'a>(&self, slot: &'a Mutex<V>) -> MutexGuard<'a, V> {
        slot.lock().unwrap_or_else(|poisoned| {
            warn!("{} slot mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Existing slot for `key`, if any.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<Mutex<V>>> {
        self.read_index().get(key).cloned()
    }

    /// Slot for `key`, created with `init` on first reference.
    pub(crate) fn get_or_insert_with(&self, key: &str, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        if let Some(slot) = self.get(key) {
            return slot;
        }
        self.write_index()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// Set the value for `key`, creating the slot if needed.
    ///
    /// The write happens under the index write lock, so a concurrent
    /// [`Self::retain`] cannot drop the slot between lookup and write.
    pub(crate) fn replace(&self, key: &str, value: V) {
        let mut index = self.write_index();
        match index.get(key) {
            Some(slot) => *self.lock(slot) = value,
            None => {
                index.insert(key.to_string(), Arc::new(Mutex::new(value)));
            }
        }
    }

    /// Drop every slot for which `keep` returns false. Returns how many were removed.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&V) -> bool) -> usize {
        let mut index = self.write_index();
        let before = index.len();
        index.retain(|_, slot| {
            let value = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            keep(&value)
        });
        before - index.len()
    }

    pub(crate) fn clear(&self) {
        self.write_index().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.read_index().len()
    }

    /// Snapshot of every (key, slot) pair, sorted by key.
    pub(crate) fn entries(&self) -> Vec<(String, Arc<Mutex<V>>)> {
        let mut entries: Vec<_> = self
            .read_index()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_created_once() {
        let slots: KeyedSlots<u32> = KeyedSlots::new("test");
        let first = slots.get_or_insert_with("A", || 1);
        *slots.lock(&first) += 1;

        let again = slots.get_or_insert_with("A", || 100);
        assert_eq!(*slots.lock(&again), 2);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_retain_removes_and_counts() {
        let slots: KeyedSlots<u32> = KeyedSlots::new("test");
        slots.get_or_insert_with("A", || 1);
        slots.get_or_insert_with("B", || 5);
        slots.get_or_insert_with("C", || 9);

        let removed = slots.retain(|v| *v < 5);
        assert_eq!(removed, 2);
        assert!(slots.get("A").is_some());
        assert!(slots.get("B").is_none());
    }

    #[test]
    fn test_replace_overwrites_or_inserts() {
        let slots: KeyedSlots<u32> = KeyedSlots::new("test");
        slots.replace("A", 1);
        let held = slots.get("A").unwrap();
        slots.replace("A", 2);

        assert_eq!(*slots.lock(&held), 2);
        assert_eq!(slots.len(), 1);

        slots.retain(|_| false);
        slots.replace("A", 3);
        let fresh = slots.get("A").unwrap();
        assert_eq!(*slots.lock(&fresh), 3);
    }

    #[test]
    fn test_entries_sorted() {
        let slots: KeyedSlots<u32> = KeyedSlots::new("test");
        slots.get_or_insert_with("ZED", || 1);
        slots.get_or_insert_with("ALPHA", || 2);

        let keys: Vec<_> = slots.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ALPHA".to_string(), "ZED".to_string()]);
    }
}
