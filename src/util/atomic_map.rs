use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};
use rustc_hash::FxHashMap;

/// A copy-on-write map for data that is read far more often than it is modified.
///
/// Readers work on an immutable snapshot and hold the lock only for cloning an `Arc`. Updates
///  copy the map, modify the copy and replace the snapshot, so each update is atomic as a whole:
///  a check and a subsequent insert in the same update cannot be interleaved with other updates.
pub struct AtomicMap<K,V> {
    map: RwLock<Arc<FxHashMap<K,V>>>,
}

impl <K: Hash+Eq+Clone+Sync+Send, V: Clone+Sync+Send> Default for AtomicMap<K,V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash+Eq+Clone+Sync+Send, V: Clone+Sync+Send> AtomicMap<K,V> {
    pub fn new() -> AtomicMap<K,V> {
        AtomicMap {
            map: RwLock::new(Arc::new(FxHashMap::default())),
        }
    }

    /// The current snapshot - later updates are not reflected in it
    pub fn load(&self) -> Arc<FxHashMap<K,V>> {
        self.map.read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.load()
            .get(key)
            .cloned()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut FxHashMap<K,V>) -> R) -> R {
        let mut guard = self.map.write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut map: FxHashMap<K,V> = guard.as_ref().clone();
        let result = f(&mut map);
        *guard = Arc::new(map);
        result
    }
}
