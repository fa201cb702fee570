//! Flags that switch themselves off after a delay
//!
//! Each `mark` spawns a timer tagged with a generation number; only the timer
//! of the latest mark for a key may clear it, so re-marking restarts the window.

use super::lock;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub struct TransientSet<K> {
    entries: Arc<Mutex<HashMap<K, u64>>>,
    generation: Arc<AtomicU64>,
}

impl<K> Clone for TransientSet<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<K> Default for TransientSet<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> TransientSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` for `ttl`; `on_clear` runs once the key actually expires
    pub fn mark<F, Fut>(&self, key: K, ttl: Duration, on_clear: F)
    where
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.entries).insert(key.clone(), generation);

        let entries = self.entries.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let expired = {
                let mut guard = lock(&entries);
                if guard.get(&key) == Some(&generation) {
                    guard.remove(&key);
                    true
                } else {
                    false
                }
            };
            if expired {
                on_clear(key).await;
            }
        });
    }

    pub fn contains(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        lock(&self.entries).keys().cloned().collect()
    }

    pub fn remove(&self, key: &K) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Single on/off flag with the same expiry semantics
#[derive(Debug, Clone, Default)]
pub struct TransientFlag {
    set: TransientSet<()>,
}

impl TransientFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise<F, Fut>(&self, ttl: Duration, on_clear: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.set.mark((), ttl, move |_| on_clear());
    }

    pub fn is_raised(&self) -> bool {
        self.set.contains(&())
    }

    pub fn lower(&self) -> bool {
        self.set.remove(&())
    }
}
