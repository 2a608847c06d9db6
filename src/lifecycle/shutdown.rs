//! Shutdown coordination.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Clones share one root lifetime. Listeners wait on it; long-lived
/// supervisors derive child lifetimes from it so they can also be stopped
/// on their own.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root lifetime that is cancelled on shutdown.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolve once shutdown has been triggered, including before the call.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}
