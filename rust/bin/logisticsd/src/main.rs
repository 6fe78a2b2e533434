//! `logisticsd`: the logistics fulfillment server.
//!
//! Usage:
//!   logisticsd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/logistics/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use logistics_core::Module;
use logistics_fulfillment::FulfillmentModule;
use logistics_kv::{FileLoader, OverlayKV, RedbStore};
use tracing::info;

use config::ServerConfig;

/// Logistics fulfillment server.
#[derive(Parser, Debug)]
#[command(name = "logisticsd", about = "Work-order fulfillment server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    config::verify(&server_config)?;

    let core_config = server_config.service_config(&cli.listen);
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    // redb underneath, reference YAML on top (read-only).
    let db = RedbStore::open(&core_config.resolve_db_path())
        .map_err(|e| anyhow::anyhow!("failed to open KV store: {}", e))?;
    let overlay = OverlayKV::new(db);
    let reference_dir = server_config.reference_dir(&core_config);
    let loaded = FileLoader::load(&reference_dir, &overlay)
        .map_err(|e| anyhow::anyhow!("failed to load reference data: {}", e))?;
    info!("Loaded {} reference entries from {}", loaded, reference_dir.display());
    let kv: Arc<dyn logistics_kv::KVStore> = Arc::new(overlay);

    let fulfillment = FulfillmentModule::new(kv, server_config.fulfillment.clone());
    info!(
        floor = server_config.fulfillment.box_number_floor,
        "Fulfillment module initialized"
    );

    let app = routes::build_router(vec![(fulfillment.name(), fulfillment.routes())]);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("logisticsd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
