//! Cache Store Module
//!
//! Main cache engine: a HashMap of entries with a uniform TTL, lazy expiry,
//! prefix invalidation, and whole-mapping persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, Clock, DurableStore, SystemClock};

/// Cache handle shared between an accessor and its in-flight requests.
pub type SharedCache = Arc<RwLock<Cache>>;

// == Cache ==
/// TTL-bounded cache persisted to one slot of a durable store.
///
/// Every mutating call rewrites the whole slot. Storage failures are logged
/// and swallowed: the in-memory mapping stays authoritative.
#[derive(Debug)]
pub struct Cache {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Uniform lifetime of every entry
    ttl: Duration,
    /// Slot holding the serialized mapping
    storage_key: String,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache and loads whatever live entries `store` holds under
    /// `storage_key`.
    pub fn new(storage_key: impl Into<String>, ttl: Duration, store: Arc<dyn DurableStore>) -> Self {
        Self::with_clock(storage_key, ttl, store, Arc::new(SystemClock))
    }

    /// Same as [`Cache::new`] with an explicit time source.
    pub fn with_clock(
        storage_key: impl Into<String>,
        ttl: Duration,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut cache = Self {
            entries: HashMap::new(),
            ttl,
            storage_key: storage_key.into(),
            store,
            clock,
        };
        cache.load();
        cache
    }

    /// Wraps the cache for sharing across async tasks.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    // == Load ==
    /// Admits persisted entries that are still live. A missing or unreadable
    /// slot leaves the cache empty.
    fn load(&mut self) {
        let raw = match self.store.get_item(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(err) => {
                warn!("Cache '{}' could not read storage: {}", self.storage_key, err);
                return;
            }
        };

        let persisted: HashMap<String, CacheEntry> = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!("Cache '{}' ignoring malformed slot: {}", self.storage_key, err);
                return;
            }
        };

        let now = self.clock.now_ms();
        let total = persisted.len();
        self.entries = persisted
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now, self.ttl))
            .collect();

        info!(
            "Cache '{}' loaded {} of {} persisted entries",
            self.storage_key,
            self.entries.len(),
            total
        );
    }

    // == Persist ==
    /// Writes the whole mapping to the slot.
    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.entries) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Cache '{}' could not serialize entries: {}", self.storage_key, err);
                return;
            }
        };

        if let Err(err) = self.store.set_item(&self.storage_key, &encoded) {
            warn!(
                "Cache '{}' persistence failed, continuing in memory: {}",
                self.storage_key, err
            );
        }
    }

    // == Get ==
    /// Returns the value for `key` if present and live.
    ///
    /// An expired entry is removed and the mapping persisted.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let expired = match self.entries.get(key) {
            None => {
                debug!("Cache miss: {}", key);
                return None;
            }
            Some(entry) => entry.is_expired(now, self.ttl),
        };

        if expired {
            debug!("Cache expired: {}", key);
            self.entries.remove(key);
            self.persist();
            return None;
        }

        debug!("Cache hit: {}", key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry and restarting
    /// its lifetime.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let entry = CacheEntry::new(value, self.clock.now_ms());
        self.entries.insert(key.into(), entry);
        self.persist();
    }

    // == Delete ==
    /// Removes `key` if present. Persists either way.
    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
        self.persist();
    }

    // == Clear ==
    /// Drops every entry and removes the slot; a missing slot loads as empty.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(err) = self.store.remove_item(&self.storage_key) {
            warn!(
                "Cache '{}' could not remove its slot, continuing in memory: {}",
                self.storage_key, err
            );
        }
    }

    // == Invalidate ==
    /// Removes every entry whose key starts with `prefix`, then persists once.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();

        self.persist();
        if removed > 0 {
            info!("Cache '{}' invalidated {} entries under '{}'", self.storage_key, removed, prefix);
        }
        removed
    }

    // == Stats ==
    /// Returns a diagnostic snapshot. Does not evict.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let expired_items = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .count();
        let total_size = serde_json::to_string(&self.entries)
            .map(|encoded| encoded.len())
            .unwrap_or(0);

        CacheStats {
            total_items: self.entries.len(),
            expired_items,
            total_size,
            ttl: self.ttl.as_millis() as u64,
        }
    }

    /// Keys currently held, expired or not.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    // == Length ==
    /// Returns the number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }
}
