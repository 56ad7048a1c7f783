//! Gateway adapter.
//!
//! Keeps an API gateway's admin configuration in step with a developer
//! portal's control plane.
//!
//! # Architecture Overview
//!
//! ```text
//!   control plane ──webhook──▶ http server ──┐
//!   config dir ──notify──▶ watcher/debounce ─┼──▶ Adapter ──▶ sync orchestrator ──▶ gateway admin API
//!   startup ─────────────────────────────────┘        │
//!                                                      └──▶ event processor / key rotation
//! ```

use std::path::PathBuf;

use clap::Parser;

use gateway_adapter::config::load_config;
use gateway_adapter::lifecycle;
use gateway_adapter::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gateway-adapter", version)]
#[command(about = "Reconciles gateway configuration with the portal control plane", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATEWAY_ADAPTER_CONFIG")]
    config: PathBuf,

    /// Do not watch the configuration directory
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-adapter starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        gateway = %config.gateway.admin_url,
        control_plane = %config.control_plane.api_url,
        max_concurrency = config.sync.max_concurrency,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config, !args.no_watch).await?;
    Ok(())
}
