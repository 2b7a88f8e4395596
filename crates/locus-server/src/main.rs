//! Locus server binary.

use std::sync::Arc;

use anyhow::Context;
use locus_source::StaticSource;
use locus_sync::{EventBus, LocationManager};
use locus_server::{AppState, Settings, init_metrics, run_server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().context("loading settings")?;
    let addr = settings.socket_addr()?;

    tracing::info!("Starting Locus server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Fixture: {}", settings.source.fixture.display());
    tracing::info!("Cache strategy: {:?}", settings.sync.cache_strategy);

    let prometheus_handle = init_metrics().context("installing metrics recorder")?;

    let source = StaticSource::from_path(&settings.source.fixture)
        .with_context(|| format!("loading {}", settings.source.fixture.display()))?;
    let manager = LocationManager::new(Arc::new(source), settings.sync, EventBus::default())?;

    // Runs until dropped
    let _sweeper = manager.start();

    run_server(addr, AppState::new(manager), prometheus_handle).await?;

    Ok(())
}
