//! HTTP API over the access layer.
//!
//! - GET    /health
//! - GET    /v1/owners/{owner}/records?offset&limit&sort&desc
//! - POST   /v1/owners/{owner}/records
//! - DELETE /v1/owners/{owner}/records/{id}
//! - GET    /v1/owners/{owner}/records/{id}/preview
//! - POST   /v1/owners/{owner}/previews
//! - GET    /v1/owners/{owner}/search?q&limit
//! - GET    /v1/cache/stats
//! - POST   /v1/cache/optimize
//! - GET    /v1/metrics/operations
//! - GET    /metrics

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::access::gate::GateError;
use crate::access::pager::{PageRequest, PagedAccessLayer, PerformanceStatistics};
use crate::access::AccessError;
use crate::cache::registry::ReclaimReport;
use crate::store::record::{Record, RecordPreview};

/// Application state shared across handlers.
pub struct AppState {
    pub access: Arc<PagedAccessLayer>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/owners/{owner}/records", get(list_records).post(create_record))
        .route("/v1/owners/{owner}/records/{id}", delete(delete_record))
        .route("/v1/owners/{owner}/records/{id}/preview", get(get_preview))
        .route("/v1/owners/{owner}/previews", post(batch_previews))
        .route("/v1/owners/{owner}/search", get(search))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/v1/cache/optimize", post(optimize))
        .route("/v1/metrics/operations", get(operation_metrics))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
    pub sort: Option<String>,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct BatchPreviewRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchPreviewResponse {
    pub previews: BTreeMap<String, Option<RecordPreview>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache_entries: usize,
    pub active_operations: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps access-layer errors to HTTP responses.
pub struct ApiError(AccessError);

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AccessError::Store(_) => StatusCode::BAD_GATEWAY,
            AccessError::Gate(GateError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AccessError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.access.performance_statistics().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache_entries: stats.caches.iter().map(|c| c.size).sum(),
        active_operations: stats.active_operations,
    })
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Record>>> {
    let config = state.access.config();
    let request = PageRequest::new(
        params.offset,
        params.limit.unwrap_or(config.default_page_size),
        params.sort.unwrap_or_else(|| config.default_sort_field.clone()),
        params.desc,
    );
    let page = state.access.list_page(&owner, &request).await?;
    Ok(Json(page))
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Record>)> {
    let record = state.access.create_record(fields, &owner).await?;
    info!(owner = %owner, record = %record.id, "Record created via API");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((owner, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let deleted = state.access.delete_record(&id, &owner).await?;
    let status = if deleted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(DeleteResponse { id, deleted })).into_response())
}

async fn get_preview(
    State(state): State<Arc<AppState>>,
    Path((owner, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    match state.access.get_preview(&id, &owner).await? {
        Some(preview) => Ok(Json(preview).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn batch_previews(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(req): Json<BatchPreviewRequest>,
) -> ApiResult<Json<BatchPreviewResponse>> {
    let previews = state.access.batch_load_previews(&req.ids, &owner).await?;
    Ok(Json(BatchPreviewResponse {
        previews: previews.into_iter().collect(),
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Record>>> {
    let hits = state.access.search(&owner, &params.q, params.limit).await?;
    Ok(Json(hits))
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<PerformanceStatistics> {
    Json(state.access.performance_statistics().await)
}

async fn optimize(State(state): State<Arc<AppState>>) -> Json<ReclaimReport> {
    Json(state.access.optimize_memory_usage().await)
}

async fn operation_metrics(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, f64>> {
    let averages: HashMap<_, _> = state.access.performance_metrics().await;
    Json(
        averages
            .into_iter()
            .map(|(kind, avg_ms)| (kind.to_string(), avg_ms))
            .collect(),
    )
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.access.render_metrics().await {
        Ok(body) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
