//! Runtime configuration for doc-cache-tier.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All caching knobs (capacities, TTL, reclamation thresholds), the admission
//! limit, and the record field mapping used by the access layer live here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::key::Namespace;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "doc-cache-tier", about = "Caching access tier for a paginated document store")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Number of demo records to seed into the in-memory store per owner.
    #[arg(long, default_value_t = 0)]
    pub seed_records: usize,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Cache registry tuning.
    pub cache: CacheConfig,

    /// Admission control.
    pub admission: AdmissionConfig,

    /// Access layer behaviour and record field mapping.
    pub access: AccessConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Cache registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries per namespace unless overridden.
    pub capacity: usize,

    /// Per-namespace capacity overrides.
    pub namespace_capacity: HashMap<Namespace, usize>,

    /// Entries untouched for longer than this are expired.
    pub ttl_secs: u64,

    /// Reclaim when total entries exceed this fraction of aggregate capacity.
    pub pressure_threshold: f64,

    /// Fraction of each namespace's capacity dropped under pressure.
    pub reclaim_fraction: f64,

    /// Interval of the background maintenance task (0 = disabled).
    pub maintenance_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            namespace_capacity: HashMap::new(),
            ttl_secs: 30 * 60,
            pressure_threshold: 0.8,
            reclaim_fraction: 0.2,
            maintenance_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    /// Capacity for a namespace, honouring overrides.
    pub fn capacity_for(&self, namespace: Namespace) -> usize {
        self.namespace_capacity
            .get(&namespace)
            .copied()
            .unwrap_or(self.capacity)
            .max(1)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_secs > 0)
            .then(|| Duration::from_secs(self.maintenance_interval_secs))
    }
}

/// Admission control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrent remote operations.
    pub max_concurrent: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_concurrent: 5 }
    }
}

/// Access layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Identifier of the remote store instance.
    pub store_id: String,

    /// Collection path records live under.
    pub collection: String,

    /// Previews fetched concurrently per batch chunk.
    pub batch_chunk_size: usize,

    /// Page size used by `preload`.
    pub default_page_size: usize,

    /// Sort field used by `preload` and when a request names none.
    pub default_sort_field: String,

    /// Field searched by the first prefix query.
    pub primary_name_field: String,

    /// Field searched by the second prefix query.
    pub secondary_name_field: String,

    /// Numeric field used to order search hits within a tier (larger = more recent).
    pub recency_field: String,

    /// Fields copied into a record preview.
    pub preview_fields: Vec<String>,

    /// List field whose leading entries are carried into a preview.
    pub notable_field: String,

    /// Number of notable entries kept in a preview.
    pub notable_limit: usize,

    /// Samples kept per operation kind for rolling averages.
    pub metrics_window: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            store_id: "default".to_string(),
            collection: "records".to_string(),
            batch_chunk_size: 10,
            default_page_size: 20,
            default_sort_field: "name".to_string(),
            primary_name_field: "name".to_string(),
            secondary_name_field: "alias".to_string(),
            recency_field: "last_active".to_string(),
            preview_fields: vec![
                "name".to_string(),
                "alias".to_string(),
                "last_active".to_string(),
            ],
            notable_field: "highlights".to_string(),
            notable_limit: 3,
            metrics_window: 100,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
