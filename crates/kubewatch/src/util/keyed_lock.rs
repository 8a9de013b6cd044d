//! Per-key async lock whose entries disappear once nobody holds or waits on them.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

type LockMap<K> = Arc<DashMap<K, Weak<Mutex<()>>>>;

/// Held while a keyed critical section runs. Dropping the last guard for a key removes
/// the key from the map.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only `self.lock` is left: no holder and no waiter for this key.
        if Arc::strong_count(&self.lock) == 1 {
            self.locks.remove(&self.key);
        }
    }
}

/// Serializes work per key while letting different keys proceed in parallel.
///
/// The supervisors use it keyed by cluster id so a control signal and the startup pass
/// never start or stop the same cluster concurrently.
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    locks: LockMap<K>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn lock(&self, key: &K) -> KeyedLockGuard<K> {
        let lock = self.get_or_create(key);
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyedLockGuard {
            guard: Some(guard),
            lock,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    fn get_or_create(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.locks.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(strong) = occupied.get().upgrade() {
                        return strong;
                    }
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let strong = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&strong));
                    return strong;
                }
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
