//! doc-cache-tier server binary.
//!
//! Serves the cached access layer over HTTP, backed by the in-memory store.
//! Pass `--seed-records N` to populate a few demo owners on startup.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use doc_cache_tier::access::PagedAccessLayer;
use doc_cache_tier::config::{Cli, Config};
use doc_cache_tier::server::api::{build_router, AppState};
use doc_cache_tier::store::{MemoryStore, Record};

const DEMO_OWNERS: &[&str] = &["demo-1", "demo-2"];
const DEMO_NAMES: &[&str] = &["Ada", "Bea", "Cal", "Dee", "Eli", "Fay", "Gus", "Hal"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "doc_cache_tier=debug,tower_http=debug"
    } else {
        "doc_cache_tier=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("doc-cache-tier v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen.clone() {
        config.server.listen = listen;
    }

    info!(
        capacity = config.cache.capacity,
        ttl_secs = config.cache.ttl_secs,
        max_concurrent = config.admission.max_concurrent,
        collection = %config.access.collection,
        "Configuration loaded"
    );

    // Remote store stand-in.
    let store = Arc::new(MemoryStore::new(config.access.store_id.clone()));
    if cli.seed_records > 0 {
        seed_demo_records(&store, &config, cli.seed_records).await;
    }

    // Build the access layer.
    let access = Arc::new(PagedAccessLayer::new(store, &config)?);
    if let Some(period) = config.cache.maintenance_interval() {
        access.start_maintenance(period).await;
    }
    if cli.seed_records > 0 {
        for owner in DEMO_OWNERS {
            access.preload(owner).await?;
        }
    }

    let state = Arc::new(AppState {
        access: access.clone(),
        start_time: Instant::now(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    access.dispose().await;
    Ok(())
}

async fn seed_demo_records(store: &MemoryStore, config: &Config, per_owner: usize) {
    for owner in DEMO_OWNERS {
        let records = (0..per_owner).map(|i| {
            let name = DEMO_NAMES[i % DEMO_NAMES.len()];
            let fields = json!({
                "name": format!("{name} {i}"),
                "alias": format!("{}{i}", name.to_lowercase()),
                "last_active": i,
                "highlights": (1..=4).map(|n| format!("{name} #{n}")).collect::<Vec<_>>(),
            });
            Record::new(
                format!("{owner}-{i}"),
                *owner,
                fields.as_object().cloned().unwrap_or_default(),
            )
        });
        store.seed(&config.access.collection, records).await;
    }
    info!(owners = DEMO_OWNERS.len(), per_owner, "Seeded demo records");
}
