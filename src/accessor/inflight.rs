//! Registry of cache-miss requests still waiting on the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::ApiError;

/// A miss fetch that any number of callers can await.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Pending fetches by cache key. Each registration gets a ticket so a fetch
/// that finishes late only removes itself, never a newer fetch for the same
/// key.
#[derive(Default)]
pub(crate) struct InFlight {
    pending: Mutex<HashMap<String, (u64, SharedFetch)>>,
    next_ticket: AtomicU64,
}

impl InFlight {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, (u64, SharedFetch)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch already running for `key`, if any.
    pub fn join(&self, key: &str) -> Option<SharedFetch> {
        self.pending().get(key).map(|(_, fetch)| fetch.clone())
    }

    /// Reserves a ticket for a fetch about to be registered.
    pub fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, key: String, ticket: u64, fetch: SharedFetch) {
        self.pending().insert(key, (ticket, fetch));
    }

    /// Removes `key` if it is still held by `ticket`.
    pub fn finish(&self, key: &str, ticket: u64) {
        let mut pending = self.pending();
        if pending.get(key).is_some_and(|(held, _)| *held == ticket) {
            pending.remove(key);
        }
    }

    /// Stops offering fetches under `prefix` to new callers. Callers already
    /// awaiting them are unaffected.
    pub fn forget_prefix(&self, prefix: &str) -> usize {
        let mut pending = self.pending();
        let before = pending.len();
        pending.retain(|key, _| !key.starts_with(prefix));
        before - pending.len()
    }

    pub fn forget(&self, key: &str) {
        self.pending().remove(key);
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    fn ready(value: Value) -> SharedFetch {
        async move { Ok(value) }.boxed().shared()
    }

    #[tokio::test]
    async fn test_join_returns_same_outcome() {
        let inflight = InFlight::default();
        let ticket = inflight.ticket();
        inflight.register("products:all".to_string(), ticket, ready(json!([1, 2])));

        let joined = inflight.join("products:all").expect("fetch should be pending");
        assert_eq!(joined.await, Ok(json!([1, 2])));
    }

    #[test]
    fn test_finish_ignores_stale_ticket() {
        let inflight = InFlight::default();
        let old = inflight.ticket();
        let new = inflight.ticket();

        inflight.register("k".to_string(), new, ready(json!(1)));
        inflight.finish("k", old);
        assert_eq!(inflight.len(), 1);

        inflight.finish("k", new);
        assert_eq!(inflight.len(), 0);
    }

    #[test]
    fn test_forget_prefix() {
        let inflight = InFlight::default();
        for key in ["products:all:1", "products:id:7", "customers:all:1"] {
            let ticket = inflight.ticket();
            inflight.register(key.to_string(), ticket, ready(json!(null)));
        }

        assert_eq!(inflight.forget_prefix("products:"), 2);
        assert!(inflight.join("customers:all:1").is_some());

        inflight.forget("customers:all:1");
        assert_eq!(inflight.len(), 0);
    }
}
