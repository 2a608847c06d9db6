//! Client side of proxy-master: pulls the synthesized document, merges
//! local additions and overrides, and keeps the proxy binary running.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use proxy_master::config::load_client_config;
use proxy_master::lifecycle::{wait_for_shutdown_signal, Shutdown};
use proxy_master::observability::init_logging;
use proxy_master::scheduler::{Scheduler, Task};
use proxy_master::supervisor::{ProcessSupervisor, SupervisorConfig};
use proxy_master::sync::{ReloadError, Syncer};

const SYNC_TASK: &str = "config-sync";

#[derive(Parser)]
#[command(name = "sync-client")]
#[command(about = "Sync the proxy configuration from a proxy-master server", long_about = None)]
struct Cli {
    /// Path to the client configuration file.
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,

    /// Keep running: re-sync periodically and supervise the proxy binary.
    #[arg(short, long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_client_config(&cli.config)?;
    init_logging(&config.log)?;

    let mut syncer = Syncer::new(&config)?;
    if !cli.daemon {
        syncer.sync().await?;
        return Ok(());
    }

    tracing::info!(interval_minutes = config.update_interval, "Starting client in daemon mode");
    let shutdown = Shutdown::new();

    if let Err(e) = syncer.sync().await {
        tracing::error!(error = %e, "Initial sync failed");
    }

    let supervisor = config
        .process
        .enabled
        .then(|| ProcessSupervisor::new(SupervisorConfig::from(&config.process)));
    if let Some(supervisor) = &supervisor {
        supervisor.start(shutdown.token());
        let reload = supervisor.clone();
        syncer.set_reload_hook(move || {
            let reload = reload.clone();
            async move { reload.reload().map_err(|e| Box::new(e) as ReloadError) }
        });
    }

    let syncer = Arc::new(syncer);
    let scheduler = Scheduler::new();
    let schedule = format!("@every {}m", config.update_interval);
    scheduler
        .add_task(Task::new(SYNC_TASK, schedule, move || {
            let syncer = syncer.clone();
            async move {
                if let Err(e) = syncer.sync().await {
                    tracing::error!(error = %e, "Scheduled sync failed");
                }
            }
        }))
        .await?;
    scheduler.start();

    wait_for_shutdown_signal().await;
    tracing::info!("Shutting down daemon");
    if let Some(supervisor) = &supervisor {
        supervisor.stop();
    }
    shutdown.trigger();
    scheduler.stop().await;
    Ok(())
}
