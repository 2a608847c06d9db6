//! Periodic replacement of decoy ports.

use std::sync::Arc;

use crate::observability::metrics;
use crate::ports::nat::{NatError, NatLifecycle, RedirectAction};
use crate::ports::ring::RingPool;
use crate::scheduler::{Task, TaskError};

/// Name under which the rotation task is registered.
pub const TASK_NAME: &str = "dynamic-port-rotation";

/// Keeps the ring pool and its NAT redirects in step.
pub struct DynamicPortService {
    pool: Arc<RingPool>,
    nat: NatLifecycle,
    target_port: u16,
}

impl DynamicPortService {
    pub fn new(pool: Arc<RingPool>, nat: NatLifecycle, target_port: u16) -> Self {
        Self {
            pool,
            nat,
            target_port,
        }
    }

    pub fn pool(&self) -> &Arc<RingPool> {
        &self.pool
    }

    pub fn nat(&self) -> &NatLifecycle {
        &self.nat
    }

    /// Install the NAT scaffolding, then fill the pool.
    pub async fn init(&self) -> Result<(), NatError> {
        self.nat.init().await?;
        self.initial_setup().await;
        Ok(())
    }

    /// Clear the pool and fill it with fresh ports, installing a redirect for each.
    ///
    /// Returns the number of resident ports afterwards.
    pub async fn initial_setup(&self) -> usize {
        self.pool.clear();
        let mut failures = 0;

        while !self.pool.is_full() {
            let Some(port) = self.pool.generate_unique() else {
                tracing::warn!(
                    active = self.pool.len(),
                    capacity = self.pool.capacity(),
                    "No free port left in range, stopping initial setup"
                );
                break;
            };
            if let Err(e) = self
                .nat
                .modify_redirect(RedirectAction::Add, port, self.target_port)
                .await
            {
                tracing::error!(port, error = %e, "Failed to add initial redirect");
                failures += 1;
                if failures > self.pool.capacity() {
                    tracing::warn!(failures, "Too many redirect failures, stopping initial setup");
                    break;
                }
                continue;
            }
            self.pool.enqueue(port);
        }

        let active = self.pool.len();
        metrics::record_active_ports(active);
        tracing::info!(active_ports = active, "Dynamic port initial setup complete");
        active
    }

    /// Replace the oldest port with a fresh one.
    ///
    /// A pool left short by an earlier failed cycle is topped up without
    /// evicting. Returns the newly activated port, if any.
    pub async fn rotate(&self) -> Option<u16> {
        if self.pool.is_full() {
            if let Some(old) = self.pool.dequeue() {
                if let Err(e) = self
                    .nat
                    .modify_redirect(RedirectAction::Delete, old, self.target_port)
                    .await
                {
                    tracing::error!(port = old, error = %e, "Failed to delete old redirect");
                }
            }
        }

        let Some(port) = self.pool.generate_unique() else {
            tracing::warn!("No free port available this cycle, skipping rotation");
            metrics::record_port_rotation("no_port");
            metrics::record_active_ports(self.pool.len());
            return None;
        };

        if let Err(e) = self
            .nat
            .modify_redirect(RedirectAction::Add, port, self.target_port)
            .await
        {
            tracing::error!(port, error = %e, "Failed to add new redirect");
            metrics::record_port_rotation("redirect_failed");
            metrics::record_active_ports(self.pool.len());
            return None;
        }

        self.pool.enqueue(port);
        metrics::record_port_rotation("rotated");
        metrics::record_active_ports(self.pool.len());
        tracing::info!(new_port = port, "Dynamic port rotated");
        Some(port)
    }

    /// Remove every NAT rule this service installed.
    pub async fn cleanup(&self) {
        match self.nat.cleanup().await {
            Ok(()) => tracing::info!("NAT cleanup complete"),
            Err(e) => tracing::error!(error = %e, "Failed to clean up NAT rules"),
        }
    }

    /// Package the service as a scheduler task firing on `schedule`.
    pub fn into_task(self: Arc<Self>, schedule: impl Into<String>) -> Task {
        let run = self.clone();
        let init = self.clone();
        let cleanup = self;
        Task::new(TASK_NAME, schedule, move || {
            let service = run.clone();
            async move {
                service.rotate().await;
            }
        })
        .with_init(move || {
            let service = init.clone();
            async move { service.init().await.map_err(|e| Box::new(e) as TaskError) }
        })
        .with_cleanup(move || {
            let service = cleanup.clone();
            async move { service.cleanup().await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::nat::testing::RecordingRunner;
    use crate::ports::nat::NatState;
    use std::collections::HashSet;

    fn service(capacity: usize, min: u16, max: u16) -> (Arc<RecordingRunner>, DynamicPortService) {
        let runner = Arc::new(RecordingRunner::default());
        let pool = Arc::new(RingPool::new(capacity, min, max));
        let nat = NatLifecycle::new(runner.clone(), "decoy", min, max);
        (runner, DynamicPortService::new(pool, nat, 443))
    }

    fn assert_unique_in_range(ports: &[u16], min: u16, max: u16) {
        let unique: HashSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), ports.len(), "duplicate port in {:?}", ports);
        assert!(ports.iter().all(|p| (min..=max).contains(p)));
    }

    #[tokio::test]
    async fn test_initial_setup_fills_pool() {
        let (runner, svc) = service(5, 40000, 40019);
        assert_eq!(svc.initial_setup().await, 5);

        let ports = svc.pool().snapshot();
        assert_eq!(ports.len(), 5);
        assert_unique_in_range(&ports, 40000, 40019);

        let redirects = runner
            .commands()
            .iter()
            .filter(|c| c.contains("REDIRECT"))
            .count();
        assert_eq!(redirects, 5);
    }

    #[tokio::test]
    async fn test_initial_setup_with_exact_width() {
        let (_, svc) = service(4, 50000, 50003);
        assert_eq!(svc.initial_setup().await, 4);
        let mut ports = svc.pool().snapshot();
        ports.sort_unstable();
        assert_eq!(ports, vec![50000, 50001, 50002, 50003]);
    }

    #[tokio::test]
    async fn test_rotation_keeps_size_and_uniqueness() {
        let (runner, svc) = service(5, 40000, 40009);
        svc.initial_setup().await;

        for _ in 0..50 {
            let before = svc.pool().snapshot();
            let new_port = svc.rotate().await.unwrap();
            let after = svc.pool().snapshot();

            assert_eq!(after.len(), 5);
            assert_unique_in_range(&after, 40000, 40009);
            assert_eq!(&after[..4], &before[1..]);
            assert_eq!(after[4], new_port);
        }

        let deletes = runner
            .commands()
            .iter()
            .filter(|c| c.starts_with("-t nat -D decoy"))
            .count();
        assert_eq!(deletes, 50);
    }

    #[tokio::test]
    async fn test_failed_install_is_refilled_next_cycle() {
        let (runner, svc) = service(3, 40000, 40009);
        svc.initial_setup().await;

        runner.fail_on("-t nat -A decoy");
        assert_eq!(svc.rotate().await, None);
        assert_eq!(svc.pool().len(), 2);

        runner.failing.lock().clear();
        assert!(svc.rotate().await.is_some());
        assert_eq!(svc.pool().len(), 3);
    }

    #[tokio::test]
    async fn test_initial_setup_gives_up_when_rules_fail() {
        let (runner, svc) = service(3, 40000, 40009);
        runner.fail_on("-t nat -A decoy");
        assert_eq!(svc.initial_setup().await, 0);
    }

    #[tokio::test]
    async fn test_task_lifecycle_hooks() {
        let (runner, svc) = service(2, 40000, 40009);
        let svc = Arc::new(svc);
        let task = svc.clone().into_task("@every 1h");
        assert_eq!(task.name(), TASK_NAME);

        task.init().await.unwrap();
        assert_eq!(svc.nat().state(), NatState::ChainLinked);
        assert_eq!(svc.pool().len(), 2);

        task.cleanup().await;
        assert_eq!(svc.nat().state(), NatState::Absent);
        assert_eq!(runner.commands().last().unwrap(), "-t nat -X decoy");
    }
}
