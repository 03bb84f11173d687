//! Block-synchronous Aave v3 flash-loan liquidation bot for Polygon.
//!
//! Per block: scan monitored borrowers' health factors, precompute executor
//! calldata for accounts drifting toward the threshold, and dispatch atomic
//! flash-loan liquidations for accounts under it.
//!
//! Configuration comes from a key=value file (path in `FLASHLIQ_CONFIG`,
//! default `.env`) overlaid by the process environment.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashliq_core::{Config, Engine, Settings, System};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flashliq_core=debug,flashliq_chain=debug")),
        )
        .init();

    let config_path =
        std::env::var("FLASHLIQ_CONFIG").unwrap_or_else(|_| ".env".to_string());
    info!(config_path, "starting flashliq");

    let config = Config::load(&config_path);
    let settings = Settings::from_config(&config).context("configuration")?;
    settings.log_summary();

    let (system, log_tasks) = System::build(settings)?;
    let engine = Engine::new(system);

    engine.run().await?;

    // The engine consumed the last handles to the sinks; their writer tasks
    // flush whatever was accepted and exit once the queues close.
    for task in log_tasks {
        let _ = task.await;
    }
    info!("shutdown complete");
    Ok(())
}
