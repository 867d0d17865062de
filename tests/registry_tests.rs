//! Integration tests for the cache registry: TTL expiry, invalidation and
//! memory-pressure reclamation.

use std::collections::HashMap;
use std::time::Duration;

use doc_cache_tier::cache::key::{CacheKey, Namespace};
use doc_cache_tier::cache::registry::CacheRegistry;
use doc_cache_tier::config::CacheConfig;

fn registry(capacity: usize) -> CacheRegistry {
    CacheRegistry::new(&CacheConfig {
        capacity,
        ..Default::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let registry = registry(100);
    registry
        .put(Namespace::Previews, CacheKey::preview("u1", "stale"), &1u32)
        .await;

    tokio::time::advance(Duration::from_secs(20 * 60)).await;
    registry
        .put(Namespace::Previews, CacheKey::preview("u1", "fresh"), &2u32)
        .await;

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    let removed = registry.clear_expired_caches().await;

    assert_eq!(removed, 1);
    assert!(!registry.contains(Namespace::Previews, &CacheKey::preview("u1", "stale")).await);
    assert!(registry.contains(Namespace::Previews, &CacheKey::preview("u1", "fresh")).await);
}

#[tokio::test(start_paused = true)]
async fn test_access_refreshes_ttl() {
    let registry = registry(100);
    let key = CacheKey::page("u1", 0, 20, "name", false);
    registry.put(Namespace::Pages, key.clone(), &vec![1, 2]).await;

    tokio::time::advance(Duration::from_secs(25 * 60)).await;
    let hit: Option<Vec<i32>> = registry.get(Namespace::Pages, &key).await;
    assert!(hit.is_some());

    tokio::time::advance(Duration::from_secs(25 * 60)).await;
    assert_eq!(registry.clear_expired_caches().await, 0);
    assert!(registry.contains(Namespace::Pages, &key).await);
}

#[tokio::test]
async fn test_invalidate_related_is_exact() {
    let registry = registry(100);
    for id in ["p1", "p2", "p3", "p22"] {
        registry
            .put(Namespace::Previews, CacheKey::preview("u1", id), &id)
            .await;
    }

    let removed = registry.invalidate_related(Namespace::Previews, "p2").await;
    assert_eq!(removed, 1);

    let mut left: Vec<String> = registry
        .keys(Namespace::Previews)
        .await
        .iter()
        .map(|k| k.to_string())
        .collect();
    left.sort();
    assert_eq!(left, vec!["u1_p1", "u1_p22", "u1_p3"]);
}

#[tokio::test]
async fn test_invalidate_owner_across_namespaces() {
    let registry = registry(100);
    registry
        .put(Namespace::Pages, CacheKey::page("u1", 0, 20, "name", false), &0)
        .await;
    registry
        .put(Namespace::Search, CacheKey::search("u1", "jo", 10), &0)
        .await;
    registry
        .put(Namespace::Pages, CacheKey::page("u2", 0, 20, "name", false), &0)
        .await;

    assert_eq!(registry.invalidate_entity_everywhere("u1").await, 2);
    assert_eq!(registry.total_entries().await, 1);
}

#[tokio::test]
async fn test_optimize_trims_under_pressure() {
    let registry = registry(10);
    // 9 + 9 + 9 + 9 = 36 of 40, above the 80% threshold.
    for ns in Namespace::ALL {
        for i in 0..9 {
            registry
                .put(ns, CacheKey::aggregate(format!("{ns}-owner"), format!("k{i}")), &i)
                .await;
        }
    }

    let report = registry.optimize_memory_usage().await;
    assert_eq!(report.entries_before, 36);
    assert_eq!(report.expired, 0);
    assert_eq!(report.trimmed, 8);
    assert_eq!(report.entries_after, 28);

    for ns in Namespace::ALL {
        let keys = registry.keys(ns).await;
        assert_eq!(keys.len(), 7);
        // The two oldest (k0, k1) are gone.
        assert!(!keys.contains(&CacheKey::aggregate(format!("{ns}-owner"), "k0")));
        assert!(!keys.contains(&CacheKey::aggregate(format!("{ns}-owner"), "k1")));
    }
}

#[tokio::test]
async fn test_optimize_below_threshold_is_noop() {
    let registry = registry(10);
    for i in 0..8 {
        registry
            .put(Namespace::Pages, CacheKey::aggregate("u1", format!("k{i}")), &i)
            .await;
    }

    let report = registry.optimize_memory_usage().await;
    assert_eq!(report.trimmed, 0);
    assert_eq!(report.entries_after, 8);
}

#[tokio::test]
async fn test_optimize_never_grows_and_spares_small_namespaces() {
    let mut namespace_capacity = HashMap::new();
    namespace_capacity.insert(Namespace::Search, 2);
    let registry = CacheRegistry::new(&CacheConfig {
        capacity: 10,
        namespace_capacity,
        ..Default::default()
    });

    for i in 0..10 {
        for ns in [Namespace::Pages, Namespace::Previews, Namespace::Aggregates] {
            registry
                .put(ns, CacheKey::aggregate("u1", format!("k{i}")), &i)
                .await;
        }
    }
    registry
        .put(Namespace::Search, CacheKey::search("u1", "a", 5), &0)
        .await;

    let report = registry.optimize_memory_usage().await;
    assert!(report.entries_after <= report.entries_before);
    // round(2 * 0.2) = 0: the small namespace keeps its entry.
    assert_eq!(registry.len(Namespace::Search).await, 1);
    assert_eq!(registry.len(Namespace::Pages).await, 8);
}

#[tokio::test(start_paused = true)]
async fn test_optimize_expires_before_trimming() {
    let registry = registry(10);
    for ns in Namespace::ALL {
        for i in 0..9 {
            registry
                .put(ns, CacheKey::aggregate("u1", format!("k{i}")), &i)
                .await;
        }
    }
    tokio::time::advance(Duration::from_secs(31 * 60)).await;

    let report = registry.optimize_memory_usage().await;
    assert_eq!(report.expired, 36);
    assert_eq!(report.trimmed, 0);
    assert_eq!(report.entries_after, 0);
}

#[tokio::test]
async fn test_get_or_compute_runs_supplier_once() {
    let registry = registry(10);
    let key = CacheKey::aggregate("u1", "total");

    let first: Result<u64, String> = registry
        .get_or_compute(Namespace::Aggregates, key.clone(), || async { Ok(42) })
        .await;
    let second: Result<u64, String> = registry
        .get_or_compute(Namespace::Aggregates, key.clone(), || async {
            Err("supplier should not run".to_string())
        })
        .await;

    assert_eq!(first, Ok(42));
    assert_eq!(second, Ok(42));
}

#[tokio::test]
async fn test_failed_supplier_caches_nothing() {
    let registry = registry(10);
    let key = CacheKey::aggregate("u1", "total");

    let failed: Result<u64, String> = registry
        .get_or_compute(Namespace::Aggregates, key.clone(), || async {
            Err("boom".to_string())
        })
        .await;
    assert!(failed.is_err());
    assert!(!registry.contains(Namespace::Aggregates, &key).await);
}
