//! Capacity-bounded key/value store with strict LRU eviction.
//!
//! Every successful `get` and every `put` moves the key to the newest end of
//! the recency order; inserting past capacity evicts exactly the single oldest
//! entry. Hit and miss counters are cumulative across `clear`.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// A generic LRU cache with hit/miss accounting.
///
/// Values are opaque; callers own key construction.
#[derive(Debug)]
pub struct EvictionCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq + Clone, V> EvictionCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a key, promoting it to newest on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up a key without touching recency or counters.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Insert or overwrite a key, making it the newest entry.
    ///
    /// Returns the entry evicted to make room, if any. Overwriting an existing
    /// key never evicts.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.contains(&key) {
            self.entries.put(key, value);
            return None;
        }
        self.entries.push(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove up to `n` least-recently-used entries, oldest first.
    pub fn remove_oldest(&mut self, n: usize) -> Vec<K> {
        let mut removed = Vec::with_capacity(n.min(self.entries.len()));
        for _ in 0..n {
            match self.entries.pop_lru() {
                Some((key, _)) => removed.push(key),
                None => break,
            }
        }
        removed
    }

    /// Keys ordered from newest to oldest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Fraction of lookups that hit (0.0 when nothing has been looked up).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Count a lookup that the caller could not use as a miss.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_evicts_single_oldest() {
        let mut cache = EvictionCache::new(2);
        assert!(cache.put("a", 1).is_none());
        assert!(cache.put("b", 2).is_none());

        let evicted = cache.put("c", 3);
        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_promotes() {
        let mut cache = EvictionCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));

        cache.put("c", 3);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_overwrite_refreshes_without_evicting() {
        let mut cache = EvictionCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert!(cache.put("a", 10).is_none());
        assert_eq!(cache.peek(&"a"), Some(&10));

        cache.put("c", 3);
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_peek_does_not_count() {
        let mut cache = EvictionCache::new(4);
        cache.put(1, "x");
        cache.peek(&1);
        cache.peek(&2);
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 0);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn test_remove_oldest_order() {
        let mut cache = EvictionCache::new(10);
        for i in 0..5 {
            cache.put(i, i);
        }
        cache.get(&0);

        let removed = cache.remove_oldest(2);
        assert_eq!(removed, vec![1, 2]);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![0, 4, 3]);

        let removed = cache.remove_oldest(10);
        assert_eq!(removed.len(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = EvictionCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"b"));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut cache = EvictionCache::new(4);
        cache.put("a", 1);
        cache.get(&"a");
        cache.get(&"z");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);

        cache.reset_stats();
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
