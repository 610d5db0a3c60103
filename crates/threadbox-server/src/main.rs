//! # threadbox Server
//!
//! Groups incoming pub/sub messages into per-topic threads and pushes
//! thread updates to connected views.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! threadbox
//!
//! # Run with custom config
//! threadbox --config /path/to/threadbox.toml
//!
//! # Run with environment variables
//! THREADBOX_PORT=8080 THREADBOX_HOST=0.0.0.0 threadbox
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "threadbox", version, about = "Per-topic message thread server")]
struct Cli {
    /// Load this config file instead of searching the default locations
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadbox=info,threadbox_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting threadbox server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
