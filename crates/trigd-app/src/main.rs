//! Signal trigger dispatcher - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use trigd_app::config::DEFAULT_CONFIG_PATH;

/// Dispatches pipeline runs for incoming market signals.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRIGD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    trigd_telemetry::init_logging()?;

    info!("Starting trigger dispatcher v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > TRIGD_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRIGD_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = trigd_app::AppConfig::load(&config_path)?;
    info!(
        signal_topic = %config.stream.topic,
        queue_topic = %config.queue.topic,
        batch_size = config.batch.batch_size,
        batch_timeout_ms = config.batch.batch_timeout_ms,
        refresh_interval_secs = config.cache.refresh_interval_secs,
        "Configuration loaded"
    );

    if args.check_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let app = trigd_app::Application::new(config);
    let summary = app.run().await?;
    info!(
        batches = summary.batches,
        dispatched = summary.dispatched,
        "Trigger dispatcher exited"
    );

    Ok(())
}
