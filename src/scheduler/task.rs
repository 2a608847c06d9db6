//! Task capability record.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Error returned by a task's init hook.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

type RunFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
type InitFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;
type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A named periodic job with optional setup and teardown.
///
/// `init` runs once at registration, before the first firing; `cleanup`
/// runs once when the task is removed or the scheduler stops.
#[derive(Clone)]
pub struct Task {
    name: String,
    schedule: String,
    run: RunFn,
    init: Option<InitFn>,
    cleanup: Option<CleanupFn>,
}

impl Task {
    pub fn new<F, Fut>(name: impl Into<String>, schedule: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            run: Arc::new(move || Box::pin(run())),
            init: None,
            cleanup: None,
        }
    }

    pub fn with_init<F, Fut>(mut self, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.init = Some(Arc::new(move || Box::pin(init())));
        self
    }

    pub fn with_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || Box::pin(cleanup())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    pub async fn run(&self) {
        (self.run)().await
    }

    pub async fn init(&self) -> Result<(), TaskError> {
        match &self.init {
            Some(init) => init().await,
            None => Ok(()),
        }
    }

    pub async fn cleanup(&self) {
        if let Some(cleanup) = &self.cleanup {
            cleanup().await
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("init", &self.init.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}
