use anyhow::{Context, Result};
use floodgate::config::{load_config, EnvOverrides, FloodgateConfig};
use floodgate::device::LoopbackDevice;
use floodgate::engine::{self, ControlEngine};
use floodgate::site::SiteMap;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floodgate=info".into()),
        )
        .init();

    info!("Floodgate starting...");

    let mut config = match std::env::var("FLOODGATE_CONFIG") {
        Ok(path) => load_config(&path)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Failed to load config {}", path))?,
        Err(_) => FloodgateConfig::default(),
    };
    EnvOverrides::from_env().apply(&mut config);

    let site = SiteMap::load(&config.site.map_path)?;
    info!(
        map_path = %config.site.map_path,
        nodes = site.nodes.len(),
        places = site.places.len(),
        "Site map loaded"
    );

    let (tx, rx) = engine::channel(config.runtime.request_buffer);
    let device = LoopbackDevice::new(tx.clone());
    let control = ControlEngine::new(site, &config, Box::new(device))?;
    let (handle, task) = engine::spawn(control, tx, rx);

    let mut steps = handle.subscribe_steps();
    let logger = tokio::spawn(async move {
        loop {
            match steps.recv().await {
                Ok(update) => info!(
                    cmd_id = %update.cmd_id,
                    uuid = %update.uuid,
                    step = %update.step,
                    "Command step"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Step log lagged, skipped updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Engine already stopped");
    }
    if let Err(e) = task.await {
        error!(error = %e, "Engine task failed");
    }
    logger.abort();

    info!(metrics = ?handle.metrics().get_snapshot(), "Floodgate stopped");
    Ok(())
}
