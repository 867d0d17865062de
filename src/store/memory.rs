//! In-memory [`RemoteStore`] implementation.
//!
//! Backs the demo server and the test suite. Every call is counted, an
//! optional delay simulates round-trip latency, and a failure switch makes
//! every call return `StoreError::Unavailable`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::query::QueryDescriptor;
use crate::store::record::Record;
use crate::store::{RemoteStore, StoreError};

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct StoreCallStats {
    pub queries: AtomicU64,
    pub gets: AtomicU64,
    pub inserts: AtomicU64,
    pub deletes: AtomicU64,
}

impl StoreCallStats {
    pub fn total(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.inserts.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
    }
}

pub struct MemoryStore {
    id: String,
    /// collection -> record id -> record
    collections: RwLock<HashMap<String, BTreeMap<String, Record>>>,
    stats: StoreCallStats,
    latency: Duration,
    failing: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collections: RwLock::new(HashMap::new()),
            stats: StoreCallStats::default(),
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert records directly, bypassing counters.
    pub async fn seed(&self, collection: &str, records: impl IntoIterator<Item = Record>) {
        let mut collections = self.collections.write().await;
        let bucket = collections.entry(collection.to_string()).or_default();
        for record in records {
            bucket.insert(record.id.clone(), record);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn stats(&self) -> &StoreCallStats {
        &self.stats
    }

    pub fn query_count(&self) -> u64 {
        self.stats.queries.load(Ordering::Relaxed)
    }

    pub fn get_count(&self) -> u64 {
        self.stats.gets.load(Ordering::Relaxed)
    }

    /// Highest number of calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    async fn round_trip(&self, counter: &AtomicU64) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable(format!("store {} is offline", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
        self.round_trip(&self.stats.queries).await?;

        let collections = self.collections.read().await;
        let Some(bucket) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Record> = bucket
            .values()
            .filter(|r| r.owner_id == query.owner_id)
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(r)))
            .filter(|r| {
                query
                    .cursor
                    .as_ref()
                    .map_or(true, |c| c.precedes(r, &query.sort))
            })
            .collect();
        matched.sort_by(|a, b| query.sort.compare(a, b));

        let page: Vec<Record> = matched
            .into_iter()
            .take(query.page_size)
            .cloned()
            .collect();

        debug!(
            collection = %query.collection,
            owner = %query.owner_id,
            returned = page.len(),
            "Query served"
        );
        Ok(page)
    }

    async fn get(
        &self,
        collection: &str,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<Record>, StoreError> {
        self.round_trip(&self.stats.gets).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|bucket| bucket.get(id))
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        self.round_trip(&self.stats.inserts).await?;
        let mut collections = self.collections.write().await;
        let bucket = collections.entry(collection.to_string()).or_default();
        if bucket.contains_key(&record.id) {
            return Err(StoreError::Rejected(format!("record {} already exists", record.id)));
        }
        bucket.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, collection: &str, owner_id: &str, id: &str) -> Result<bool, StoreError> {
        self.round_trip(&self.stats.deletes).await?;
        let mut collections = self.collections.write().await;
        let Some(bucket) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match bucket.get(id) {
            Some(r) if r.owner_id == owner_id => {
                bucket.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
