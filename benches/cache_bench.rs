//! Benchmarks for the cache tier.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use doc_cache_tier::access::search::{merge_and_rank, SearchFields};
use doc_cache_tier::cache::eviction::EvictionCache;
use doc_cache_tier::cache::key::{CacheKey, Namespace};
use doc_cache_tier::cache::registry::CacheRegistry;
use doc_cache_tier::config::CacheConfig;
use doc_cache_tier::store::Record;

fn bench_eviction_put_get(c: &mut Criterion) {
    let mut cache = EvictionCache::new(1000);
    for i in 0..1000u64 {
        cache.put(i, i);
    }

    c.bench_function("eviction_put_get_1k", |b| {
        let mut next = 1000u64;
        b.iter(|| {
            cache.put(black_box(next), next);
            black_box(cache.get(&(next - 500)));
            next += 1;
        })
    });
}

fn bench_search_ranking(c: &mut Criterion) {
    let fields = SearchFields {
        primary: "name",
        secondary: "alias",
        recency: "last_active",
    };
    let make = |prefix: &str| -> Vec<Record> {
        (0..100)
            .map(|i| {
                let value = json!({
                    "name": format!("{prefix} {i}"),
                    "alias": format!("{prefix}{i}"),
                    "last_active": i,
                });
                Record::new(
                    format!("{prefix}-{i}"),
                    "u1",
                    value.as_object().cloned().unwrap_or_default(),
                )
            })
            .collect()
    };
    let by_name = make("John");
    let by_alias = make("Johnny");

    c.bench_function("search_merge_rank_200", |b| {
        b.iter(|| {
            let ranked = merge_and_rank(
                [by_name.clone(), by_alias.clone()],
                black_box("john"),
                fields,
                10,
            );
            black_box(ranked);
        })
    });
}

fn bench_registry_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = CacheRegistry::new(&CacheConfig::default());
    let key = CacheKey::page("u1", 0, 20, "name", false);
    runtime.block_on(registry.put(Namespace::Pages, key.clone(), &vec!["r1"; 20]));

    c.bench_function("registry_get_or_compute_hit", |b| {
        b.to_async(&runtime).iter(|| async {
            let page: Result<Vec<String>, ()> = registry
                .get_or_compute(Namespace::Pages, key.clone(), || async { Ok(Vec::new()) })
                .await;
            black_box(page)
        })
    });
}

criterion_group!(
    benches,
    bench_eviction_put_get,
    bench_search_ranking,
    bench_registry_hit,
);
criterion_main!(benches);
