//! Hidden Lake node binary.
//!
//! # Usage
//!
//! ```bash
//! # Join the network named in hls.yml, storing state under ./data
//! hiddenlake-node --config hls.yml --networks networks.yml --data-dir data
//!
//! # Spend four cores on proof-of-work
//! hiddenlake-node --config hls.yml --parallel 4
//! ```

use std::path::PathBuf;

use clap::Parser;
use hiddenlake_core::NetworkRegistry;
use hiddenlake_node::{AppConfig, NodeApp, load_identity};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Hidden Lake anonymity node
#[derive(Parser, Debug)]
#[command(name = "hiddenlake-node")]
#[command(about = "Hidden Lake anonymizing overlay node")]
#[command(version)]
struct Args {
    /// Path to the node's service configuration (YAML)
    #[arg(short, long, default_value = "hls.yml")]
    config: PathBuf,

    /// Path to the shared network profiles (YAML)
    #[arg(short, long, default_value = "networks.yml")]
    networks: PathBuf,

    /// Directory for the identity key and the hash log
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Proof-of-work workers racing per frame
    #[arg(long, default_value = "1")]
    parallel: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("hidden lake node starting");

    let config = AppConfig::load(&args.config)?;
    let registry_raw = std::fs::read_to_string(&args.networks)?;
    let registry = NetworkRegistry::from_yaml(&registry_raw)?;

    std::fs::create_dir_all(&args.data_dir)?;
    let key = load_identity(&args.data_dir)?;

    let app = NodeApp::init(&config, &registry, key, &args.data_dir, args.parallel)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    app.run(cancel).await?;

    tracing::info!("hidden lake node stopped");
    Ok(())
}
