//! Per-key async locks.
//!
//! A lock table keyed by arbitrary hashable keys. Entries are created on
//! first use and removed when the last guard or waiter for a key goes
//! away, so the table only ever holds keys that are currently busy.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

pub struct KeyedLocks<K> {
    table: Table<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(table.entry(key.clone()).or_default())
    }

    /// Take the lock for `key` if nobody holds it.
    pub fn try_acquire(&self, key: &K) -> Option<KeyGuard<K>> {
        let mutex = self.entry(key);
        match Arc::clone(&mutex).try_lock_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => {
                // Our clone of the entry must not keep it alive.
                self.release(key, mutex);
                None
            }
        }
    }

    /// Wait for the lock for `key`.
    ///
    /// Dropping the returned future before it resolves releases its claim
    /// on the entry.
    pub async fn acquire(&self, key: &K) -> KeyGuard<K> {
        let waiting = Waiting {
            key: key.clone(),
            table: Arc::clone(&self.table),
        };
        let guard = {
            let mutex = self.entry(key);
            mutex.lock_owned().await
        };
        let guard = self.guard(key, guard);
        drop(waiting);
        guard
    }

    /// Whether someone currently holds the lock for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.get(key).is_some_and(|m| m.try_lock().is_err())
    }

    /// Number of keys with a holder or waiter.
    pub fn active_keys(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn guard(&self, key: &K, guard: OwnedMutexGuard<()>) -> KeyGuard<K> {
        KeyGuard {
            key: key.clone(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    fn release(&self, key: &K, mutex: Arc<AsyncMutex<()>>) {
        drop(mutex);
        prune(&self.table, key);
    }
}

/// Remove the entry for `key` if only the table still references it.
fn prune<K: Hash + Eq>(table: &Table<K>, key: &K) {
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
    if table.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
        table.remove(key);
    }
}

/// Prunes a key once its pending `acquire` finishes or is abandoned. The
/// entry reference taken inside `acquire` is scoped so it is gone first.
struct Waiting<K: Hash + Eq> {
    key: K,
    table: Table<K>,
}

impl<K: Hash + Eq> Drop for Waiting<K> {
    fn drop(&mut self) {
        prune(&self.table, &self.key);
    }
}

/// Held lock for one key. Dropping it releases the key.
pub struct KeyGuard<K: Hash + Eq> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    table: Table<K>,
}

impl<K: Hash + Eq> KeyGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Hash + Eq> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // The guard owns an Arc to the mutex; drop it before pruning.
        drop(self.guard.take());
        prune(&self.table, &self.key);
    }
}
