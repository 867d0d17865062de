//! Cache registry: one eviction cache per namespace plus the bookkeeping that
//! spans them.
//!
//! The registry:
//! - Serves typed get / put / get-or-compute over JSON-encoded payloads
//! - Tracks a last-touch instant per entry for TTL expiry
//! - Indexes entries by the entity ids their keys reference, so a mutation
//!   can invalidate exactly the affected entries
//! - Counts invalidations per entity, so a fetch that started before a
//!   mutation cannot write its stale result back afterwards
//! - Runs a two-phase reclamation pass (expiry first, then LRU trimming)
//!
//! Locking: each namespace has its own mutex, and the touch map and entity
//! index share a second one. When both are needed the tracking lock is taken
//! first; no code path ever holds two namespace locks, and no lock is held
//! across a caller-supplied future.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::eviction::EvictionCache;
use crate::cache::key::{CacheKey, Namespace};
use crate::config::CacheConfig;

type EntryId = (Namespace, CacheKey);

/// Per-namespace statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceStats {
    pub namespace: Namespace,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Outcome of one `optimize_memory_usage` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub entries_before: usize,
    pub expired: usize,
    pub trimmed: usize,
    pub entries_after: usize,
}

/// Invalidation state of a key's entities, taken before a remote fetch.
///
/// A result is only cached if no entity the key references was invalidated
/// (and the registry was not cleared) while the fetch was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStamp {
    epoch: u64,
    generations: Vec<u64>,
}

#[derive(Debug, Default)]
struct Tracking {
    last_touch: HashMap<EntryId, Instant>,
    index: HashMap<String, HashSet<EntryId>>,
    generations: HashMap<String, u64>,
    epoch: u64,
}

impl Tracking {
    fn track(&mut self, namespace: Namespace, key: &CacheKey, now: Instant) {
        for entity in key.entity_ids() {
            self.index
                .entry(entity.to_string())
                .or_default()
                .insert((namespace, key.clone()));
        }
        self.last_touch.insert((namespace, key.clone()), now);
    }

    fn touch(&mut self, namespace: Namespace, key: &CacheKey, now: Instant) {
        if let Some(at) = self.last_touch.get_mut(&(namespace, key.clone())) {
            *at = now;
        }
    }

    fn forget(&mut self, namespace: Namespace, key: &CacheKey) {
        let id = (namespace, key.clone());
        self.last_touch.remove(&id);
        for entity in key.entity_ids() {
            if let Some(refs) = self.index.get_mut(entity) {
                refs.remove(&id);
                if refs.is_empty() {
                    self.index.remove(entity);
                }
            }
        }
    }

    fn related(&self, namespace: Namespace, entity_id: &str) -> Vec<CacheKey> {
        self.index
            .get(entity_id)
            .map(|refs| {
                refs.iter()
                    .filter(|(ns, _)| *ns == namespace)
                    .map(|(_, key)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn stamp(&self, key: &CacheKey) -> FetchStamp {
        FetchStamp {
            epoch: self.epoch,
            generations: key
                .entity_ids()
                .into_iter()
                .map(|entity| self.generations.get(entity).copied().unwrap_or(0))
                .collect(),
        }
    }

    fn bump(&mut self, entity_id: &str) {
        *self.generations.entry(entity_id.to_string()).or_default() += 1;
    }

    fn clear(&mut self) {
        self.last_touch.clear();
        self.index.clear();
        // Generations restart from zero; the epoch keeps older stamps stale.
        self.generations.clear();
        self.epoch += 1;
    }
}

/// Multiplexes the namespace caches.
pub struct CacheRegistry {
    caches: [Mutex<EvictionCache<CacheKey, Value>>; 4],
    tracking: Mutex<Tracking>,
    ttl: Duration,
    pressure_threshold: f64,
    reclaim_fraction: f64,
}

impl CacheRegistry {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            caches: Namespace::ALL
                .map(|ns| Mutex::new(EvictionCache::new(config.capacity_for(ns)))),
            tracking: Mutex::new(Tracking::default()),
            ttl: config.ttl(),
            pressure_threshold: config.pressure_threshold,
            reclaim_fraction: config.reclaim_fraction,
        }
    }

    fn slot(&self, namespace: Namespace) -> &Mutex<EvictionCache<CacheKey, Value>> {
        &self.caches[namespace as usize]
    }

    /// Look up a cached value, refreshing its last-touch time on a hit.
    ///
    /// A payload that no longer decodes as `T` is dropped and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &CacheKey,
    ) -> Option<T> {
        let decoded = {
            let mut cache = self.slot(namespace).lock().await;
            let Some(value) = cache.peek(key).cloned() else {
                cache.record_miss();
                debug!(%namespace, %key, "Cache miss");
                return None;
            };
            let decoded = serde_json::from_value::<T>(value);
            if decoded.is_ok() {
                // Promote and count the hit.
                cache.get(key);
            }
            decoded
        };

        match decoded {
            Ok(decoded) => {
                self.tracking
                    .lock()
                    .await
                    .touch(namespace, key, Instant::now());
                debug!(%namespace, %key, "Cache hit");
                Some(decoded)
            }
            Err(e) => {
                warn!(%namespace, %key, error = %e, "Dropping undecodable cache entry");
                let mut tracking = self.tracking.lock().await;
                let mut cache = self.slot(namespace).lock().await;
                cache.remove(key);
                cache.record_miss();
                tracking.forget(namespace, key);
                None
            }
        }
    }

    /// Store a value, evicting the namespace's oldest entry if it is full.
    pub async fn put<T: Serialize>(&self, namespace: Namespace, key: CacheKey, value: &T) {
        self.insert(namespace, key, value, None).await;
    }

    /// Capture the invalidation state of `key` before fetching its value.
    pub async fn fetch_stamp(&self, key: &CacheKey) -> FetchStamp {
        self.tracking.lock().await.stamp(key)
    }

    /// Store a fetched value unless `key` was invalidated since `stamp` was taken.
    ///
    /// Returns whether the value was cached.
    pub async fn put_if_fresh<T: Serialize>(
        &self,
        namespace: Namespace,
        key: CacheKey,
        value: &T,
        stamp: &FetchStamp,
    ) -> bool {
        self.insert(namespace, key, value, Some(stamp)).await
    }

    async fn insert<T: Serialize>(
        &self,
        namespace: Namespace,
        key: CacheKey,
        value: &T,
        stamp: Option<&FetchStamp>,
    ) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(%namespace, %key, error = %e, "Value not cacheable");
                return false;
            }
        };

        let mut tracking = self.tracking.lock().await;
        if let Some(stamp) = stamp {
            if tracking.stamp(&key) != *stamp {
                debug!(%namespace, %key, "Discarding result fetched before invalidation");
                return false;
            }
        }

        let evicted = self.slot(namespace).lock().await.put(key.clone(), value);
        if let Some((old, _)) = evicted {
            debug!(%namespace, key = %old, "Evicted least recently used entry");
            tracking.forget(namespace, &old);
        }
        tracking.track(namespace, &key, Instant::now());
        true
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// Supplier errors are propagated and nothing is cached. A value whose key
    /// was invalidated while the supplier ran is returned but not cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: Namespace,
        key: CacheKey,
        supplier: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(namespace, &key).await {
            return Ok(hit);
        }
        let stamp = self.fetch_stamp(&key).await;
        let value = supplier().await?;
        self.put_if_fresh(namespace, key, &value, &stamp).await;
        Ok(value)
    }

    pub async fn contains(&self, namespace: Namespace, key: &CacheKey) -> bool {
        self.slot(namespace).lock().await.contains(key)
    }

    pub async fn remove(&self, namespace: Namespace, key: &CacheKey) -> bool {
        let mut tracking = self.tracking.lock().await;
        let removed = self.slot(namespace).lock().await.remove(key).is_some();
        tracking.forget(namespace, key);
        removed
    }

    /// Remove every entry in `namespace` whose key references `entity_id`.
    pub async fn invalidate_related(&self, namespace: Namespace, entity_id: &str) -> usize {
        let mut tracking = self.tracking.lock().await;
        tracking.bump(entity_id);
        let targets = tracking.related(namespace, entity_id);
        if targets.is_empty() {
            return 0;
        }

        let mut removed = 0;
        {
            let mut cache = self.slot(namespace).lock().await;
            for key in &targets {
                if cache.remove(key).is_some() {
                    removed += 1;
                }
            }
        }
        for key in &targets {
            tracking.forget(namespace, key);
        }

        debug!(%namespace, entity_id, removed, "Invalidated related entries");
        removed
    }

    /// Invalidate `entity_id` in every namespace.
    pub async fn invalidate_entity_everywhere(&self, entity_id: &str) -> usize {
        let mut removed = 0;
        for ns in Namespace::ALL {
            removed += self.invalidate_related(ns, entity_id).await;
        }
        removed
    }

    /// Remove every entry untouched for longer than the TTL.
    pub async fn clear_expired_caches(&self) -> usize {
        let now = Instant::now();
        let mut tracking = self.tracking.lock().await;

        let mut expired: HashMap<Namespace, Vec<CacheKey>> = HashMap::new();
        for ((ns, key), at) in &tracking.last_touch {
            if now.duration_since(*at) > self.ttl {
                expired.entry(*ns).or_default().push(key.clone());
            }
        }

        let mut removed = 0;
        for (ns, keys) in expired {
            {
                let mut cache = self.slot(ns).lock().await;
                for key in &keys {
                    if cache.remove(key).is_some() {
                        removed += 1;
                    }
                }
            }
            for key in &keys {
                tracking.forget(ns, key);
            }
        }

        if removed > 0 {
            info!(removed, ttl_secs = self.ttl.as_secs(), "Expired stale cache entries");
        }
        removed
    }

    /// Two-phase reclamation: expire stale entries, then, if the registry is
    /// still above the pressure threshold, drop the oldest `reclaim_fraction`
    /// of capacity from every namespace.
    pub async fn optimize_memory_usage(&self) -> ReclaimReport {
        let entries_before = self.total_entries().await;
        let expired = self.clear_expired_caches().await;

        let remaining = self.total_entries().await;
        let capacity = self.total_capacity().await;
        let mut trimmed = 0;

        if remaining as f64 > capacity as f64 * self.pressure_threshold {
            let mut tracking = self.tracking.lock().await;
            for ns in Namespace::ALL {
                let removed = {
                    let mut cache = self.slot(ns).lock().await;
                    let count = (cache.capacity() as f64 * self.reclaim_fraction).round() as usize;
                    cache.remove_oldest(count)
                };
                for key in &removed {
                    tracking.forget(ns, key);
                }
                trimmed += removed.len();
            }
        }

        let report = ReclaimReport {
            entries_before,
            expired,
            trimmed,
            entries_after: self.total_entries().await,
        };
        info!(
            before = report.entries_before,
            expired = report.expired,
            trimmed = report.trimmed,
            after = report.entries_after,
            "Memory optimisation pass complete"
        );
        report
    }

    /// Size and hit rate per namespace.
    pub async fn cache_statistics(&self) -> Vec<NamespaceStats> {
        let mut stats = Vec::with_capacity(Namespace::ALL.len());
        for ns in Namespace::ALL {
            let cache = self.slot(ns).lock().await;
            stats.push(NamespaceStats {
                namespace: ns,
                size: cache.len(),
                capacity: cache.capacity(),
                hits: cache.hits(),
                misses: cache.misses(),
                hit_rate: cache.hit_rate(),
            });
        }
        stats
    }

    /// Keys of a namespace, newest first.
    pub async fn keys(&self, namespace: Namespace) -> Vec<CacheKey> {
        self.slot(namespace).lock().await.keys().cloned().collect()
    }

    pub async fn len(&self, namespace: Namespace) -> usize {
        self.slot(namespace).lock().await.len()
    }

    pub async fn total_entries(&self) -> usize {
        let mut total = 0;
        for ns in Namespace::ALL {
            total += self.slot(ns).lock().await.len();
        }
        total
    }

    pub async fn total_capacity(&self) -> usize {
        let mut total = 0;
        for ns in Namespace::ALL {
            total += self.slot(ns).lock().await.capacity();
        }
        total
    }

    /// Empty every namespace and drop all tracking state.
    pub async fn clear_all(&self) {
        let mut tracking = self.tracking.lock().await;
        for ns in Namespace::ALL {
            self.slot(ns).lock().await.clear();
        }
        tracking.clear();
        info!("Cleared all caches");
    }

    /// Run `optimize_memory_usage` every `period` until the handle is aborted.
    pub fn spawn_maintenance(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.optimize_memory_usage().await;
            }
        })
    }
}
