//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the ring pool, NAT rotation task and subscription engine
//! - Register periodic tasks with the scheduler
//! - Serve subscribers until shutdown, then stop every task
//!
//! # Design Decisions
//! - A rotation task that fails to initialize is logged, not fatal; the
//!   engine then serves base ports from an empty pool
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::ports::{DynamicPortService, Iptables, NatLifecycle, RingPool, RuleRunner};
use crate::scheduler::Scheduler;
use crate::subscription::{SubscriptionError, SubscriptionService};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully assembled server daemon.
pub struct ServerApp {
    config: ServerConfig,
    scheduler: Arc<Scheduler>,
    service: Arc<SubscriptionService>,
    pool: Option<Arc<RingPool>>,
}

impl ServerApp {
    /// Assemble the daemon with NAT rules applied through `iptables`.
    pub async fn build(config: ServerConfig) -> Result<Self, StartupError> {
        Self::build_with_runner(config, Arc::new(Iptables)).await
    }

    pub async fn build_with_runner(
        config: ServerConfig,
        runner: Arc<dyn RuleRunner>,
    ) -> Result<Self, StartupError> {
        let scheduler = Arc::new(Scheduler::new());
        let dp = &config.dynamic_port;

        let pool = if dp.enabled {
            let pool = Arc::new(RingPool::new(dp.active_count, dp.min, dp.max));
            let nat = NatLifecycle::new(runner, dp.chain_name.clone(), dp.min, dp.max);
            let rotation = Arc::new(DynamicPortService::new(pool.clone(), nat, dp.target_port));
            if let Err(e) = scheduler.add_task(rotation.into_task(dp.cycle.clone())).await {
                tracing::error!(error = %e, "Failed to register dynamic port task");
            }
            Some(pool)
        } else {
            None
        };

        let service = Arc::new(SubscriptionService::new(&config, pool.clone())?);
        tracing::info!(
            additions = config.additions.len(),
            dynamic_port = dp.enabled,
            "Server assembled"
        );

        Ok(Self {
            config,
            scheduler,
            service,
            pool,
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn service(&self) -> &Arc<SubscriptionService> {
        &self.service
    }

    pub fn pool(&self) -> Option<&Arc<RingPool>> {
        self.pool.as_ref()
    }

    /// Start tasks and serve on `listener` until `shutdown` fires.
    ///
    /// Every task's cleanup has run by the time this returns.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), StartupError> {
        self.scheduler.start();

        let state = AppState {
            service: self.service.clone(),
            subscription: Arc::new(self.config.subscription.clone()),
        };
        let server = HttpServer::new(state, Duration::from_secs(self.config.timeouts.request_secs));
        let served = server.run(listener, &shutdown).await;

        self.scheduler.stop().await;
        served?;
        Ok(())
    }
}
