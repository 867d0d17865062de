//! Paged access layer: the read-through orchestrator.
//!
//! Every read checks the cache registry first. On a miss the layer takes an
//! admission permit, performs the remote round trip(s), drops the permit and
//! populates the cache. Mutations go straight to the store and then
//! invalidate every cached entry that references the record or its owner.
//!
//! The layer is an explicitly constructed context object: it owns its
//! registry, gate and metrics, and is torn down with [`PagedAccessLayer::dispose`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::gate::AdmissionGate;
use crate::access::metrics::{MetricsError, OperationKind, OperationMetrics};
use crate::access::search::{merge_and_rank, range_prefix, SearchFields};
use crate::access::AccessError;
use crate::cache::key::{CacheKey, Namespace};
use crate::cache::registry::{CacheRegistry, NamespaceStats, ReclaimReport};
use crate::config::{AccessConfig, Config};
use crate::store::query::{Cursor, QueryDescriptor, RangeFilter, SortDirection, SortSpec};
use crate::store::record::{Record, RecordPreview};
use crate::store::RemoteStore;

/// Parameters of one listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
    pub sort_field: String,
    pub descending: bool,
}

impl PageRequest {
    pub fn new(
        offset: usize,
        limit: usize,
        sort_field: impl Into<String>,
        descending: bool,
    ) -> Self {
        Self {
            offset,
            limit,
            sort_field: sort_field.into(),
            descending,
        }
    }
}

/// Snapshot returned by [`PagedAccessLayer::performance_statistics`].
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStatistics {
    pub caches: Vec<NamespaceStats>,
    pub active_operations: usize,
    pub max_concurrent: usize,
}

pub struct PagedAccessLayer {
    store: Arc<dyn RemoteStore>,
    registry: Arc<CacheRegistry>,
    gate: AdmissionGate,
    metrics: OperationMetrics,
    config: AccessConfig,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl PagedAccessLayer {
    pub fn new(store: Arc<dyn RemoteStore>, config: &Config) -> Result<Self, AccessError> {
        Ok(Self {
            store,
            registry: Arc::new(CacheRegistry::new(&config.cache)),
            gate: AdmissionGate::new(config.admission.max_concurrent),
            metrics: OperationMetrics::new(config.access.metrics_window)?,
            config: config.access.clone(),
            maintenance: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    // ─── Reads ─────────────────────────────────────────────────────────────

    /// One page of an owner's records, served from cache when possible.
    pub async fn list_page(
        &self,
        owner_id: &str,
        request: &PageRequest,
    ) -> Result<Vec<Record>, AccessError> {
        self.timed(OperationKind::ListPage, self.load_page(owner_id, request))
            .await
    }

    /// Preview of a single record; `Ok(None)` if the record does not exist.
    pub async fn get_preview(
        &self,
        record_id: &str,
        owner_id: &str,
    ) -> Result<Option<RecordPreview>, AccessError> {
        self.timed(OperationKind::GetPreview, self.load_preview(record_id, owner_id))
            .await
    }

    /// Previews for many records. Every requested id appears in the result.
    pub async fn batch_load_previews(
        &self,
        record_ids: &[String],
        owner_id: &str,
    ) -> Result<HashMap<String, Option<RecordPreview>>, AccessError> {
        self.timed(
            OperationKind::BatchLoadPreviews,
            self.load_previews(record_ids, owner_id),
        )
        .await
    }

    /// Ranked prefix search over the primary and secondary name fields.
    pub async fn search(
        &self,
        owner_id: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, AccessError> {
        self.timed(OperationKind::Search, self.run_search(owner_id, term, limit))
            .await
    }

    /// Warm the caches with an owner's first page and its previews.
    ///
    /// Returns the number of previews loaded.
    pub async fn preload(&self, owner_id: &str) -> Result<usize, AccessError> {
        self.timed(OperationKind::Preload, async {
            let request = PageRequest::new(
                0,
                self.config.default_page_size,
                self.config.default_sort_field.clone(),
                false,
            );
            let page = self.load_page(owner_id, &request).await?;
            let ids: Vec<String> = page.iter().map(|r| r.id.clone()).collect();
            let previews = self.load_previews(&ids, owner_id).await?;
            info!(owner = owner_id, previews = previews.len(), "Preloaded owner");
            Ok::<_, AccessError>(previews.len())
        })
        .await
    }

    /// Cached value of a caller-defined aggregate for an owner.
    ///
    /// Aggregates are invalidated with the rest of the owner's entries on any
    /// mutation. The supplier is not gated; if it reads from the store it
    /// should do so through this layer's own operations.
    pub async fn aggregate<T, F, Fut>(
        &self,
        owner_id: &str,
        name: &str,
        supplier: F,
    ) -> Result<T, AccessError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AccessError>>,
    {
        self.registry
            .get_or_compute(Namespace::Aggregates, CacheKey::aggregate(owner_id, name), supplier)
            .await
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// Create a record with a fresh id, then invalidate the owner's entries.
    pub async fn create_record(
        &self,
        fields: Map<String, Value>,
        owner_id: &str,
    ) -> Result<Record, AccessError> {
        self.timed(OperationKind::CreateRecord, async {
            let record = Record::new(Uuid::new_v4().to_string(), owner_id, fields);
            {
                let _permit = self.gate.acquire().await?;
                self.store
                    .insert(&self.config.collection, record.clone())
                    .await?;
            }
            let invalidated = self.invalidate_for(&record.id, owner_id).await;
            info!(record = %record.id, owner = owner_id, invalidated, "Created record");
            Ok::<_, AccessError>(record)
        })
        .await
    }

    /// Delete a record, then invalidate its and its owner's entries.
    ///
    /// Returns whether the record existed.
    pub async fn delete_record(
        &self,
        record_id: &str,
        owner_id: &str,
    ) -> Result<bool, AccessError> {
        self.timed(OperationKind::DeleteRecord, async {
            let existed = {
                let _permit = self.gate.acquire().await?;
                self.store
                    .delete(&self.config.collection, owner_id, record_id)
                    .await?
            };
            let invalidated = self.invalidate_for(record_id, owner_id).await;
            info!(record = record_id, owner = owner_id, existed, invalidated, "Deleted record");
            Ok::<_, AccessError>(existed)
        })
        .await
    }

    // ─── Observability and lifecycle ───────────────────────────────────────

    pub async fn performance_statistics(&self) -> PerformanceStatistics {
        PerformanceStatistics {
            caches: self.registry.cache_statistics().await,
            active_operations: self.gate.active(),
            max_concurrent: self.gate.max_concurrent(),
        }
    }

    /// Average milliseconds per operation kind over the recent window.
    pub async fn performance_metrics(&self) -> HashMap<OperationKind, f64> {
        self.metrics.averages().await
    }

    /// Prometheus text exposition of operation and cache metrics.
    pub async fn render_metrics(&self) -> Result<String, MetricsError> {
        let caches = self.registry.cache_statistics().await;
        self.metrics.render(&caches, self.gate.active())
    }

    pub async fn optimize_memory_usage(&self) -> ReclaimReport {
        self.registry.optimize_memory_usage().await
    }

    /// Start periodic reclamation; replaces any running maintenance task.
    pub async fn start_maintenance(&self, period: Duration) {
        let handle = self.registry.clone().spawn_maintenance(period);
        if let Some(previous) = self.maintenance.lock().await.replace(handle) {
            previous.abort();
        }
        info!(period_secs = period.as_secs(), "Cache maintenance started");
    }

    pub async fn clear_all_caches(&self) {
        self.registry.clear_all().await;
    }

    /// Stop maintenance, drop every cached entry and close the gate.
    ///
    /// Operations issued afterwards that need the remote store fail with
    /// `GateError::Closed`.
    pub async fn dispose(&self) {
        if let Some(handle) = self.maintenance.lock().await.take() {
            handle.abort();
        }
        self.registry.clear_all().await;
        self.gate.close();
        info!("Access layer disposed");
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    async fn timed<T, Fut>(&self, kind: OperationKind, operation: Fut) -> Result<T, AccessError>
    where
        Fut: Future<Output = Result<T, AccessError>>,
    {
        let started = Instant::now();
        let result = operation.await;
        self.metrics
            .record(kind, started.elapsed(), result.is_ok())
            .await;
        result
    }

    fn descriptor(&self, owner_id: &str, sort: SortSpec, page_size: usize) -> QueryDescriptor {
        QueryDescriptor::new(
            self.store.store_id(),
            self.config.collection.as_str(),
            owner_id,
            sort,
            page_size,
        )
    }

    async fn load_page(
        &self,
        owner_id: &str,
        request: &PageRequest,
    ) -> Result<Vec<Record>, AccessError> {
        if request.limit == 0 {
            return Err(AccessError::InvalidRequest("page limit must be positive".to_string()));
        }
        let key = CacheKey::page(
            owner_id,
            request.offset,
            request.limit,
            request.sort_field.as_str(),
            request.descending,
        );
        self.registry
            .get_or_compute(Namespace::Pages, key, || self.fetch_page(owner_id, request))
            .await
    }

    /// Offset paging: skip `offset` records to find a cursor, then read `limit`
    /// records after it. Both round trips share one admission permit.
    async fn fetch_page(
        &self,
        owner_id: &str,
        request: &PageRequest,
    ) -> Result<Vec<Record>, AccessError> {
        let sort = SortSpec::new(
            request.sort_field.as_str(),
            SortDirection::from_descending(request.descending),
        );
        let mut query = self.descriptor(owner_id, sort.clone(), request.limit);

        let _permit = self.gate.acquire().await?;
        if request.offset > 0 {
            let skipped = self
                .store
                .query(&query.clone().with_page_size(request.offset))
                .await?;
            match skipped.last() {
                Some(last) if skipped.len() == request.offset => {
                    query = query.start_after(Cursor::after(last, &sort));
                }
                _ => {
                    debug!(
                        owner = owner_id,
                        offset = request.offset,
                        "Offset beyond end of listing"
                    );
                    return Ok(Vec::new());
                }
            }
        }

        let page = self.store.query(&query).await?;
        debug!(
            owner = owner_id,
            offset = request.offset,
            returned = page.len(),
            "Fetched page"
        );
        Ok(page)
    }

    async fn load_preview(
        &self,
        record_id: &str,
        owner_id: &str,
    ) -> Result<Option<RecordPreview>, AccessError> {
        let key = CacheKey::preview(owner_id, record_id);
        if let Some(preview) = self.registry.get::<RecordPreview>(Namespace::Previews, &key).await {
            return Ok(Some(preview));
        }
        self.fetch_preview(record_id, owner_id).await
    }

    /// Remote preview fetch; caches the preview when the record exists and was
    /// not invalidated while the fetch ran.
    async fn fetch_preview(
        &self,
        record_id: &str,
        owner_id: &str,
    ) -> Result<Option<RecordPreview>, AccessError> {
        let key = CacheKey::preview(owner_id, record_id);
        let stamp = self.registry.fetch_stamp(&key).await;
        let record = {
            let _permit = self.gate.acquire().await?;
            self.store
                .get(&self.config.collection, owner_id, record_id)
                .await?
        };

        let Some(record) = record else {
            debug!(record = record_id, owner = owner_id, "Preview requested for missing record");
            return Ok(None);
        };

        let preview = record.preview(
            &self.config.preview_fields,
            &self.config.notable_field,
            self.config.notable_limit,
        );
        self.registry
            .put_if_fresh(Namespace::Previews, key, &preview, &stamp)
            .await;
        Ok(Some(preview))
    }

    async fn load_previews(
        &self,
        record_ids: &[String],
        owner_id: &str,
    ) -> Result<HashMap<String, Option<RecordPreview>>, AccessError> {
        let mut results = HashMap::with_capacity(record_ids.len());
        let mut seen = HashSet::new();
        let mut uncached = Vec::new();

        for id in record_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let key = CacheKey::preview(owner_id, id.as_str());
            match self.registry.get::<RecordPreview>(Namespace::Previews, &key).await {
                Some(preview) => {
                    results.insert(id.clone(), Some(preview));
                }
                None => uncached.push(id.as_str()),
            }
        }

        debug!(
            owner = owner_id,
            cached = results.len(),
            uncached = uncached.len(),
            "Batch preview partition"
        );

        let chunk_size = self.config.batch_chunk_size.max(1);
        for (index, chunk) in uncached.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::task::yield_now().await;
            }
            let fetched = join_all(chunk.iter().map(|id| self.fetch_preview(id, owner_id))).await;
            for (id, outcome) in chunk.iter().zip(fetched) {
                results.insert(id.to_string(), outcome?);
            }
        }

        Ok(results)
    }

    async fn run_search(
        &self,
        owner_id: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, AccessError> {
        let term = term.trim();
        if term.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let key = CacheKey::search(owner_id, term, limit);
        self.registry
            .get_or_compute(Namespace::Search, key, || self.fetch_search(owner_id, term, limit))
            .await
    }

    async fn fetch_search(
        &self,
        owner_id: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, AccessError> {
        let prefix = range_prefix(term);
        let fields = SearchFields {
            primary: &self.config.primary_name_field,
            secondary: &self.config.secondary_name_field,
            recency: &self.config.recency_field,
        };

        let by_field = |field: &str| {
            self.descriptor(owner_id, SortSpec::new(field, SortDirection::Asc), limit)
                .with_filter(RangeFilter::prefix(field, &prefix))
        };
        let primary = by_field(fields.primary);
        let secondary = by_field(fields.secondary);

        let (by_primary, by_secondary) =
            tokio::try_join!(self.gated_query(&primary), self.gated_query(&secondary))?;

        let ranked = merge_and_rank([by_primary, by_secondary], term, fields, limit);
        debug!(owner = owner_id, term, hits = ranked.len(), "Search complete");
        Ok(ranked)
    }

    async fn gated_query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, AccessError> {
        let _permit = self.gate.acquire().await?;
        Ok(self.store.query(query).await?)
    }

    async fn invalidate_for(&self, record_id: &str, owner_id: &str) -> usize {
        self.registry.invalidate_entity_everywhere(record_id).await
            + self.registry.invalidate_entity_everywhere(owner_id).await
    }
}
