use std::{sync::Arc, time::Duration};

use clap::Parser;
use dotenv::dotenv;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use peer_atlas::{
    cli::Cli,
    config::CrawlerConfig,
    crawl::{provider_from_config, Crawler, HttpRpcFactory},
    db::PgStorage,
    error::AppError,
    storage::{MemoryStorage, Storage},
    utils::create_http_client,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize environment
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();
    let config = CrawlerConfig::from_cli(&cli)?;

    if !config.crawling_enabled() {
        tracing::info!("node crawling disabled");
        return Ok(());
    }

    // Setup storage, falling back to memory when no database is configured
    let storage: Arc<dyn Storage> = match cli.database_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(PgStorage::connect(url).await?),
        _ => {
            tracing::info!("No DATABASE_URL provided, running in memory-only mode");
            Arc::new(MemoryStorage::new())
        }
    };

    let rpc_factory = Arc::new(HttpRpcFactory::new(create_http_client(config.rpc_timeout)?));
    let geo_provider = provider_from_config(&config.geo)?;

    let crawler = Arc::new(Crawler::new(config, storage, rpc_factory, geo_provider)?);

    let handle = tokio::spawn(crawler.clone().start());

    // Wait for CTRL+C signal
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Error handling shutdown signal: {}", err);
    }

    tracing::info!("Received shutdown signal, beginning graceful shutdown...");
    crawler.stop();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => tracing::debug!("Crawler task completed successfully"),
        Ok(Err(e)) => tracing::warn!("Crawler task ended with error: {}", e),
        Err(_) => tracing::warn!("Crawler did not stop within {:?}", SHUTDOWN_TIMEOUT),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
