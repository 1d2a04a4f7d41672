//! Cache Entry Module
//!
//! Defines the unit the cache manages: a payload plus the time it was written.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single stored record.
///
/// Serializes as `{ "value": <payload>, "timestamp": <unix ms> }`, which is also
/// the persisted slot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached response body
    pub value: Value,
    /// Write time (Unix milliseconds)
    pub timestamp: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stamped at `now_ms`.
    pub fn new(value: Value, now_ms: u64) -> Self {
        Self {
            value,
            timestamp: now_ms,
        }
    }

    /// Milliseconds since the entry was written. Entries stamped in the future
    /// (clock moved backwards) have age zero.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }

    // == Is Expired ==
    /// Checks if the entry has outlived `ttl`.
    ///
    /// Boundary condition: an entry whose age equals the TTL exactly is still
    /// live; it expires once the age is strictly greater.
    pub fn is_expired(&self, now_ms: u64, ttl: Duration) -> bool {
        u128::from(self.age_ms(now_ms)) > ttl.as_millis()
    }

    /// Remaining lifetime in milliseconds, zero once expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64, ttl: Duration) -> u64 {
        let ttl_ms = ttl.as_millis().min(u128::from(u64::MAX)) as u64;
        ttl_ms.saturating_sub(self.age_ms(now_ms))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_millis(1_000);

    #[test]
    fn test_entry_fresh() {
        let entry = CacheEntry::new(json!(42), 10_000);

        assert_eq!(entry.age_ms(10_500), 500);
        assert!(!entry.is_expired(10_500, TTL));
        assert_eq!(entry.ttl_remaining_ms(10_500, TTL), 500);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(json!("v"), 10_000);

        assert!(!entry.is_expired(11_000, TTL), "age == ttl is still live");
        assert!(entry.is_expired(11_001, TTL), "age > ttl is expired");
        assert_eq!(entry.ttl_remaining_ms(11_001, TTL), 0);
    }

    #[test]
    fn test_timestamp_in_future_counts_as_fresh() {
        let entry = CacheEntry::new(json!(null), 20_000);

        assert_eq!(entry.age_ms(10_000), 0);
        assert!(!entry.is_expired(10_000, TTL));
    }

    #[test]
    fn test_persisted_shape() {
        let entry = CacheEntry::new(json!({"id": 1}), 1_700_000_000_000);
        let encoded = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            encoded,
            json!({"value": {"id": 1}, "timestamp": 1_700_000_000_000u64})
        );
    }
}
