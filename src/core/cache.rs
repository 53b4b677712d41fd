use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::FlagValue;

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Thread-safe cache with per-entry TTL.
///
/// Entries are never evicted; once expired they are treated as absent until
/// overwritten.
pub struct Cache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> Cache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };

        self.entries.write().insert(key, entry);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Flag evaluation results keyed by `(flag_key, subject_id)`.
pub struct FlagCache {
    inner: Cache<(String, String), FlagValue>,
}

impl FlagCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::new(ttl),
        }
    }

    pub fn get(&self, flag_key: &str, subject_id: &str) -> Option<FlagValue> {
        self.inner
            .get(&(flag_key.to_string(), subject_id.to_string()))
    }

    pub fn set(&self, flag_key: impl Into<String>, subject_id: impl Into<String>, value: FlagValue) {
        self.inner.set((flag_key.into(), subject_id.into()), value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
