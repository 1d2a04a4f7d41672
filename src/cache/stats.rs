//! Cache Statistics Module
//!
//! Diagnostic snapshot of a cache's contents.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of a cache. Taking it never evicts anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries present, expired or not
    pub total_items: usize,
    /// Entries whose age exceeds the TTL right now
    pub expired_items: usize,
    /// Length in bytes of the serialized mapping
    pub total_size: usize,
    /// Configured TTL in milliseconds
    pub ttl: u64,
}

impl CacheStats {
    /// Entries that a `get` would still return.
    pub fn live_items(&self) -> usize {
        self.total_items - self.expired_items
    }

    /// Fraction of entries that are stale, or 0.0 for an empty cache.
    pub fn expired_ratio(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.expired_items as f64 / self.total_items as f64
        }
    }
}
