use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Advisory locks addressed by string key.
///
/// Entries are created on first use and dropped again once the last holder
/// or waiter is gone, so the map only ever contains keys that are in use.
#[derive(Clone, Default)]
pub struct KeyedLock {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in `keys`.
    ///
    /// Keys are taken in sorted order with duplicates removed, so two callers
    /// asking for overlapping sets cannot deadlock each other.
    pub async fn lock<I, K>(&self, keys: I) -> KeyedGuard
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        // Built up front so a cancelled acquisition still cleans up its keys.
        let mut guard = KeyedGuard {
            locks: self.locks.clone(),
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guard.keys.push(key);
            guard.guards.push(mutex.lock_owned().await);
        }

        guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Holds a set of keys until dropped
pub struct KeyedGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Only the map itself still references an idle mutex.
            self.locks
                .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

pub fn group_key(group_id: &str) -> String {
    format!("group:{}", group_id)
}

pub fn app_key(app_client_id: &str) -> String {
    format!("app:{}", app_client_id)
}
