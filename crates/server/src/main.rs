mod bootstrap;

use std::time::Duration;

use anyhow::Result;
use travo_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use travo_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let sweep_interval = Duration::from_secs(app.config.sweeper.interval_hours * 3600);
    let scheduler = travo_workflow::spawn_scheduler(app.sweeper.clone(), sweep_interval);
    tracing::info!(
        event_name = "sweeper_scheduled",
        interval_hours = app.config.sweeper.interval_hours,
        "expiry sweeper scheduled"
    );

    tracing::info!(event_name = "server_started", "travo-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "server_stopping", "travo-server stopping");
    scheduler.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
