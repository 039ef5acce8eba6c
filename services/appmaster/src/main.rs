use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yardarm_appmaster::{AppmasterConfig, AppmasterContext, MockResourceManager};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppmasterConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        priority = %config.allocation.priority,
        memory_mb = config.allocation.memory_mb,
        virtual_cores = config.allocation.virtual_cores,
        locality = config.allocation.locality,
        "Configuration loaded"
    );

    // Create the resource manager (mock for now)
    let rm = Arc::new(MockResourceManager::new());

    let context = AppmasterContext::new(config, rm)?;
    context.allocator().allocate_any(context.config().initial_containers);
    context.start()?;

    info!("Application master running, press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutdown signal received");
    context.stop().await?;

    let state = context.monitor().state();
    info!(
        completed = state.completed,
        failed = state.failed,
        "Application master exited"
    );

    Ok(())
}
