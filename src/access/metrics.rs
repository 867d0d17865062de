//! Operation latency metrics.
//!
//! Keeps the most recent `window` samples per operation kind for rolling
//! averages, and mirrors every sample into a per-instance Prometheus
//! registry for scraping.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::registry::NamespaceStats;

/// Operation latency buckets (seconds): 1ms .. 10s.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Kinds of access-layer operation that are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListPage,
    GetPreview,
    BatchLoadPreviews,
    Search,
    CreateRecord,
    DeleteRecord,
    Preload,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ListPage => "list_page",
            OperationKind::GetPreview => "get_preview",
            OperationKind::BatchLoadPreviews => "batch_load_previews",
            OperationKind::Search => "search",
            OperationKind::CreateRecord => "create_record",
            OperationKind::DeleteRecord => "delete_record",
            OperationKind::Preload => "preload",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct OperationMetrics {
    window: usize,
    samples: Mutex<HashMap<OperationKind, VecDeque<Duration>>>,
    registry: Registry,
    durations: HistogramVec,
    operations: IntCounterVec,
    gate_active: IntGauge,
    cache_entries: GaugeVec,
    cache_hit_rate: GaugeVec,
}

impl OperationMetrics {
    pub fn new(window: usize) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let durations = HistogramVec::new(
            HistogramOpts::new(
                "doc_cache_operation_duration_seconds",
                "Access layer operation duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["operation"],
        )?;
        let operations = IntCounterVec::new(
            Opts::new("doc_cache_operations_total", "Access layer operations by outcome"),
            &["operation", "outcome"],
        )?;
        let gate_active = IntGauge::new(
            "doc_cache_admission_active",
            "Remote operations currently admitted",
        )?;
        let cache_entries = GaugeVec::new(
            Opts::new("doc_cache_entries", "Entries held per cache namespace"),
            &["namespace"],
        )?;
        let cache_hit_rate = GaugeVec::new(
            Opts::new("doc_cache_hit_rate", "Hit rate per cache namespace"),
            &["namespace"],
        )?;

        registry.register(Box::new(durations.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(gate_active.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;

        Ok(Self {
            window: window.max(1),
            samples: Mutex::new(HashMap::new()),
            registry,
            durations,
            operations,
            gate_active,
            cache_entries,
            cache_hit_rate,
        })
    }

    /// Record one completed operation.
    pub async fn record(&self, kind: OperationKind, elapsed: Duration, success: bool) {
        self.durations
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
        let outcome = if success { "ok" } else { "error" };
        self.operations
            .with_label_values(&[kind.as_str(), outcome])
            .inc();

        let mut samples = self.samples.lock().await;
        let window = samples.entry(kind).or_default();
        window.push_back(elapsed);
        while window.len() > self.window {
            window.pop_front();
        }
    }

    /// Average elapsed milliseconds per operation kind over the rolling window.
    pub async fn averages(&self) -> HashMap<OperationKind, f64> {
        let samples = self.samples.lock().await;
        samples
            .iter()
            .filter(|(_, window)| !window.is_empty())
            .map(|(kind, window)| {
                let total: Duration = window.iter().sum();
                let avg_ms = total.as_secs_f64() * 1000.0 / window.len() as f64;
                (*kind, avg_ms)
            })
            .collect()
    }

    pub async fn sample_count(&self, kind: OperationKind) -> usize {
        self.samples
            .lock()
            .await
            .get(&kind)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Render the Prometheus text exposition, refreshing the point-in-time gauges first.
    pub fn render(
        &self,
        caches: &[NamespaceStats],
        gate_active: usize,
    ) -> Result<String, MetricsError> {
        self.gate_active.set(gate_active as i64);
        for stats in caches {
            let ns = stats.namespace.name();
            self.cache_entries
                .with_label_values(&[ns])
                .set(stats.size as f64);
            self.cache_hit_rate
                .with_label_values(&[ns])
                .set(stats.hit_rate);
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
