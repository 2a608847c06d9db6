//! proxy-master server daemon.
//!
//! Serves synthesized subscription documents and keeps the decoy port pool
//! rotating behind NAT redirects.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────┐
//!                      │                  PROXY MASTER                  │
//!   GET /sub?token=    │  ┌────────┐   ┌────────────┐   ┌────────────┐  │
//!   ───────────────────┼─▶│  http  │──▶│subscription│──▶│   fetch    │──┼──▶ Additions
//!                      │  │ + auth │   │   engine   │   │ (≤5 live)  │  │
//!   YAML document      │  └────────┘   └─────┬──────┘   └────────────┘  │
//!   ◀──────────────────┼──────────────       │ draw                     │
//!                      │               ┌─────▼──────┐                   │
//!                      │  ┌─────────┐  │ ring pool  │◀─┐                │
//!                      │  │scheduler│──▶  rotation  │  │   ┌─────────┐  │
//!                      │  └─────────┘  └─────┬──────┘  └───│   nat   │──┼──▶ iptables
//!                      │                     └────────────▶└─────────┘  │
//!                      └────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use proxy_master::config::load_server_config;
use proxy_master::lifecycle::{wait_for_shutdown_signal, ServerApp, Shutdown};
use proxy_master::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "proxy-master")]
#[command(about = "Subscription synthesis and dynamic port control plane", long_about = None)]
struct Cli {
    /// Path to the server configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_server_config(&cli.config)?;
    init_logging(&config.log)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-master starting");
    tracing::info!(
        listen = %config.listen,
        base_document = %config.base_document_path,
        additions = config.additions.len(),
        dynamic_port = config.dynamic_port.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listen).await?;
    let app = ServerApp::build(config).await?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        trigger.trigger();
    });

    app.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
