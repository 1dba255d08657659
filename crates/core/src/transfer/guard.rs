//! Per-instance in-flight registry with scoped release.

use std::{collections::HashSet, hash::Hash, sync::Arc};

use parking_lot::Mutex;

use crate::models::ItemInstanceId;

/// Set of keys with an operation currently running.
///
/// Acquisition is non-blocking: a key already present is refused instead of
/// queued. The returned guard removes the key when dropped, which covers early
/// returns, errors and cancelled futures alike.
pub struct InFlightRegistry<K = ItemInstanceId> {
    keys: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for InFlightRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<K> Default for InFlightRegistry<K> {
    fn default() -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K> InFlightRegistry<K>
where
    K: Eq + Hash + Clone,
{
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`, or `None` when it is already in flight.
    pub fn try_acquire(&self, key: K) -> Option<InFlightGuard<K>> {
        let mut keys = self.keys.lock();
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    /// Whether `key` is currently registered.
    pub fn contains(&self, key: &K) -> bool {
        self.keys.lock().contains(key)
    }

    /// Number of keys in flight.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// Releases its key from the registry on drop.
pub struct InFlightGuard<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> InFlightGuard<K> {
    /// Key held by this guard.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}
