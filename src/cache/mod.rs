//! Cache Module
//!
//! Provides a TTL-bounded key-value cache with lazy expiry, prefix
//! invalidation, and persistence to a durable backing store.

mod backing;
mod clock;
mod entry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backing::{DurableStore, FileStore, MemoryStore, DEFAULT_QUOTA_BYTES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{Cache, SharedCache};
