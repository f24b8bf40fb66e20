//! adserve: targeted ad serving with click de-duplication and statistics.
//!
//! Main entry point that wires the store, engine, and HTTP server.

use adserve_api::{ApiServer, AppState};
use adserve_core::{AppConfig, SystemClock};
use adserve_store::{seed_demo_data, MemoryStore};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "adserve")]
#[command(about = "Targeted ad serving with click de-duplication and statistics")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADSERVE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ADSERVE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Load a demo campaign, ads, and carousel at startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adserve=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("adserve starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.seed_demo {
        config.store.seed_demo_data = true;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        dedup_window_secs = config.serving.click_dedup_window_secs,
        seeded_rng = config.serving.rng_seed.is_some(),
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new(Arc::new(SystemClock)));
    if config.store.seed_demo_data {
        seed_demo_data(&store)?;
    }

    let state = AppState::new(store, &config);
    let api_server = ApiServer::new(config.clone(), state);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("adserve is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
