//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check expiry, invalidation, persistence and stats
//! behavior over generated keys and timings.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, Clock, ManualClock, MemoryStore};

// == Test Configuration ==
const TEST_TTL_MS: u64 = 1_000;
const STORAGE_KEY: &str = "prop-cache";

fn new_cache(store: &MemoryStore, clock: &ManualClock) -> Cache {
    Cache::with_clock(
        STORAGE_KEY,
        Duration::from_millis(TEST_TTL_MS),
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
    )
}

// == Strategies ==
/// Colon-delimited keys drawn from a small alphabet so prefixes collide often
fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[ab]{1,2}", 1..4).prop_map(|segments| segments.join(":"))
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,16}".prop_map(Value::from),
        (any::<u32>(), "[a-z]{1,8}").prop_map(|(id, name)| json!({"id": id, "name": name})),
    ]
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
    Invalidate { prefix: String },
    Advance { ms: u64 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        "[ab:]{0,3}".prop_map(|prefix| CacheOp::Invalidate { prefix }),
        (0..600u64).prop_map(|ms| CacheOp::Advance { ms }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // A value is returned at every instant up to and including the TTL and
    // never after it.
    #[test]
    fn prop_ttl_expiry(value in value_strategy(), elapsed in 0..3 * TEST_TTL_MS) {
        let clock = ManualClock::new(50_000);
        let mut cache = new_cache(&MemoryStore::new(), &clock);

        cache.set("k", value.clone());
        clock.advance(Duration::from_millis(elapsed));

        let got = cache.get("k");
        if elapsed > TEST_TTL_MS {
            prop_assert!(got.is_none(), "expired after {}ms", elapsed);
        } else {
            prop_assert_eq!(got, Some(value));
        }
    }

    // After invalidate(p) every key starting with p is gone and every other
    // key is untouched.
    #[test]
    fn prop_prefix_invalidation_complete(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..30),
        prefix in "[ab:]{0,3}",
    ) {
        let mut cache = new_cache(&MemoryStore::new(), &ManualClock::new(0));
        let mut expected: HashMap<String, Value> = HashMap::new();

        for (key, value) in entries {
            cache.set(key.clone(), value.clone());
            expected.insert(key, value);
        }

        cache.invalidate(&prefix);

        for (key, value) in expected {
            if key.starts_with(&prefix) {
                prop_assert!(cache.get(&key).is_none(), "{} survived '{}'", key, prefix);
            } else {
                prop_assert_eq!(cache.get(&key), Some(value));
            }
        }
    }

    // A fresh cache over the same slot sees exactly the live entries of the
    // previous one.
    #[test]
    fn prop_persistence_roundtrip(
        writes in prop::collection::vec((key_strategy(), value_strategy(), 0..700u64), 1..20),
        reload_delay in 0..TEST_TTL_MS,
    ) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let mut original = new_cache(&store, &clock);

        for (key, value, gap) in writes {
            clock.advance(Duration::from_millis(gap));
            original.set(key, value);
        }
        clock.advance(Duration::from_millis(reload_delay));

        let keys: HashSet<String> = original.keys().map(str::to_string).collect();
        let live_before: HashMap<String, Value> = keys
            .iter()
            .filter_map(|key| original.get(key).map(|value| (key.clone(), value)))
            .collect();

        let mut reloaded = new_cache(&store, &clock);
        prop_assert_eq!(reloaded.len(), live_before.len());
        for (key, value) in live_before {
            prop_assert_eq!(reloaded.get(&key), Some(value));
        }
    }

    // Stats agree with the mapping and taking them changes nothing.
    #[test]
    fn prop_stats_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let clock = ManualClock::new(0);
        let mut cache = new_cache(&MemoryStore::new(), &clock);
        let mut written_at: HashMap<String, u64> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    cache.set(key.clone(), value);
                    written_at.insert(key, clock.now_ms());
                }
                CacheOp::Get { key } => {
                    if cache.get(&key).is_none() {
                        written_at.remove(&key);
                    }
                }
                CacheOp::Delete { key } => {
                    cache.delete(&key);
                    written_at.remove(&key);
                }
                CacheOp::Invalidate { prefix } => {
                    cache.invalidate(&prefix);
                    written_at.retain(|key, _| !key.starts_with(&prefix));
                }
                CacheOp::Advance { ms } => clock.advance(Duration::from_millis(ms)),
            }
        }

        let now = clock.now_ms();
        let expected_expired = written_at
            .values()
            .filter(|&&at| now - at > TEST_TTL_MS)
            .count();

        let stats = cache.stats();
        prop_assert_eq!(stats.total_items, written_at.len());
        prop_assert_eq!(stats.expired_items, expected_expired);
        prop_assert_eq!(stats.ttl, TEST_TTL_MS);
        prop_assert_eq!(cache.stats(), stats);
        prop_assert_eq!(cache.len(), written_at.len());
    }
}

