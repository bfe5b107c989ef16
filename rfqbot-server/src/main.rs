//! rfqbot daemon
//!
//! Watches the OTC swap side-channels of one peer and drives its trades
//! forward through the peer's tool surface.

mod config;
mod daemon;
mod shutdown;

use clap::Parser;
use config::ConfigLoader;
use daemon::Daemon;
use shutdown::{ControlSignal, Signals};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// rfqbot - OTC swap trade automation
#[derive(Parser, Debug)]
#[command(name = "rfqbot")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./rfqbot.toml")]
    config: PathBuf,

    /// Override the bridge base URL (e.g., http://127.0.0.1:9333)
    #[arg(long, env = "RFQBOT_BRIDGE_URL")]
    bridge_url: Option<Url>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting rfqbot v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(&args.config, args.bridge_url);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        "Configuration loaded from {:?}, bridge at {}",
        config_loader.path(),
        loaded_config.bridge.base_url
    );

    let mut signals = Signals::install()?;

    let mut daemon = Daemon::new(loaded_config.bridge.clone());
    daemon.start(&loaded_config).await.map_err(|e| {
        tracing::error!("Failed to start trade automation: {}", e);
        e
    })?;

    let reason = loop {
        match signals.next().await {
            ControlSignal::Shutdown(reason) => break reason,
            ControlSignal::Reload => match config_loader.reload() {
                Ok(config) => daemon.reload(&config).await,
                Err(e) => tracing::error!("Failed to reload configuration: {}", e),
            },
        }
    };

    daemon.shutdown(reason).await;
    tracing::info!("rfqbot shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rfqbot_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
