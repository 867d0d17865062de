//! Read-through access layer over the remote store.
//!
//! - [`gate`]: AdmissionGate bounding concurrent remote operations
//! - [`metrics`]: Rolling operation latency averages and Prometheus export
//! - [`search`]: Merge/dedup/rank of prefix search results
//! - [`pager`]: PagedAccessLayer, the orchestrator callers talk to

pub mod gate;
pub mod metrics;
pub mod pager;
pub mod search;

use thiserror::Error;

use crate::access::gate::GateError;
use crate::access::metrics::MetricsError;
use crate::store::StoreError;

pub use gate::{AdmissionGate, AdmissionPermit};
pub use metrics::{OperationKind, OperationMetrics};
pub use pager::{PageRequest, PagedAccessLayer, PerformanceStatistics};

#[derive(Error, Debug)]
pub enum AccessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
