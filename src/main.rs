mod config;
mod models;
mod pipeline;
mod services;
mod transport;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::transport::StdinTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iptv_harvester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Mandatory keys missing is the one fatal error class; exit non-zero.
    let config = Config::from_env().context("configuration error")?;

    tracing::info!("Starting iptv-harvester v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        api_id = config.api_id,
        api_hash_len = config.api_hash.len(),
        "transport credentials loaded"
    );
    tracing::info!("Channels: {}", config.source_channels.join(", "));
    tracing::info!(
        "Webhook: {}",
        if config.webhook_url.is_empty() {
            "not configured"
        } else {
            config.webhook_url.as_str()
        }
    );
    tracing::info!("Data dir: {}", config.data_dir.display());
    tracing::info!("Auto test: {}", config.auto_test);

    tokio::fs::create_dir_all(config.lists_dir())
        .await
        .context("creating lists directory")?;

    let mut transport = StdinTransport::subscribe(&config.source_channels);
    let mut pipeline = Pipeline::new(&config);
    pipeline.run(&mut transport).await?;

    tracing::info!("shutting down");
    Ok(())
}
