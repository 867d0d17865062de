//! Integration tests for the LRU eviction cache.

use std::collections::VecDeque;

use proptest::prelude::*;

use doc_cache_tier::cache::eviction::EvictionCache;

#[test]
fn test_size_never_exceeds_capacity() {
    let mut cache = EvictionCache::new(16);
    for i in 0..1000u32 {
        cache.put(i % 97, i);
        assert!(cache.len() <= 16);
    }
    assert_eq!(cache.len(), 16);
}

#[test]
fn test_survivors_are_most_recently_used() {
    let mut cache = EvictionCache::new(3);
    cache.put("a", 1);
    cache.put("b", 2);
    cache.put("c", 3);

    // Touch "a" so "b" becomes the LRU entry.
    assert_eq!(cache.get(&"a"), Some(&1));
    let evicted = cache.put("d", 4);
    assert_eq!(evicted, Some(("b", 2)));

    let keys: Vec<_> = cache.keys().copied().collect();
    assert_eq!(keys, vec!["d", "a", "c"]);
}

#[test]
fn test_overwrite_refreshes_without_eviction() {
    let mut cache = EvictionCache::new(2);
    cache.put("a", 1);
    cache.put("b", 2);
    assert_eq!(cache.put("a", 10), None);
    assert_eq!(cache.len(), 2);

    // "b" is now the oldest.
    cache.put("c", 3);
    assert!(!cache.contains(&"b"));
    assert_eq!(cache.peek(&"a"), Some(&10));
}

#[test]
fn test_hit_rate_accounting() {
    let mut cache = EvictionCache::new(4);
    assert_eq!(cache.hit_rate(), 0.0);

    cache.put(1, "one");
    cache.get(&1);
    cache.get(&1);
    cache.get(&1);
    cache.get(&2);

    assert_eq!(cache.hits(), 3);
    assert_eq!(cache.misses(), 1);
    assert!((cache.hit_rate() - 0.75).abs() < 1e-9);

    // Peeking is not an access.
    cache.peek(&5);
    assert_eq!(cache.misses(), 1);
}

#[test]
fn test_clear_keeps_counters() {
    let mut cache = EvictionCache::new(4);
    cache.put(1, 1);
    cache.get(&1);
    cache.clear();

    assert!(cache.is_empty());
    assert_eq!(cache.hits(), 1);

    cache.reset_stats();
    assert_eq!(cache.hits(), 0);
}

#[test]
fn test_remove_oldest_takes_lru_first() {
    let mut cache = EvictionCache::new(10);
    for i in 0..5 {
        cache.put(i, i);
    }
    let removed = cache.remove_oldest(2);
    assert_eq!(removed, vec![0, 1]);
    assert_eq!(cache.len(), 3);

    // Asking for more than is held empties the cache.
    assert_eq!(cache.remove_oldest(50).len(), 3);
    assert!(cache.is_empty());
}

#[test]
fn test_get_after_eviction_is_none() {
    let mut cache = EvictionCache::new(2);
    cache.put("a", 1);
    cache.put("b", 2);
    cache.put("c", 3);
    assert_eq!(cache.get(&"a"), None);
    assert_eq!(cache.misses(), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u32),
    Get(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..16).prop_map(Op::Get),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Survivors are exactly the `capacity` most recently touched keys, and a
    /// lookup of an evicted key misses.
    #[test]
    fn prop_matches_recency_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let mut cache = EvictionCache::new(capacity);
        // Oldest at the front.
        let mut model: VecDeque<(u8, u32)> = VecDeque::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let mut expected_evicted = None;
                    if let Some(pos) = model.iter().position(|(key, _)| *key == k) {
                        model.remove(pos);
                    } else if model.len() == capacity {
                        expected_evicted = model.pop_front();
                    }
                    model.push_back((k, v));
                    prop_assert_eq!(cache.put(k, v), expected_evicted);
                }
                Op::Get(k) => {
                    let expected = model
                        .iter()
                        .position(|(key, _)| *key == k)
                        .and_then(|pos| model.remove(pos));
                    if let Some(entry) = expected {
                        model.push_back(entry);
                    }
                    prop_assert_eq!(cache.get(&k).copied(), expected.map(|(_, v)| v));
                }
            }
            prop_assert!(cache.len() <= capacity);
        }

        let survivors: Vec<u8> = cache.keys().copied().collect();
        let expected: Vec<u8> = model.iter().rev().map(|(k, _)| *k).collect();
        prop_assert_eq!(survivors, expected);
    }
}
