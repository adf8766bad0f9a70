//! Price service entry point

use anyhow::{Context, Result};
use clap::Parser;
use realty_price_core::config::AppConfig;
use realty_price_service::{start_server, PricingContext};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "price-service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-estate price prediction API", long_about = None)]
struct Args {
    /// Configuration file (TOML); defaults to config/realty.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!("Starting realty price service v{}", realty_price_service::VERSION);

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let context = PricingContext::bootstrap(config).await.map_err(|e| {
        error!("Failed to prepare model: {}", e);
        e
    })?;

    start_server(context).await?;
    info!("Price service stopped");
    Ok(())
}

fn init_logging() {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
