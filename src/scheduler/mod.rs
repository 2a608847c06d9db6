//! Periodic task scheduler.
//!
//! # Data Flow
//! ```text
//! add_task(task)
//!     → schedule.rs (parse expression)
//!     → task init hook (synchronously, before scheduling)
//!     → registry (name → entry)
//!     → timer loop spawned if the scheduler is running
//!
//! stop()
//!     → cancel every timer loop
//!     → run every cleanup hook exactly once
//!     → registry emptied
//! ```
//!
//! # Design Decisions
//! - Start/stop are global; tasks may be added before or after start
//! - A task's runs never overlap: each loop awaits its run before re-arming
//! - Removing an entry from the registry is what grants the right to run cleanup

pub mod schedule;
pub mod task;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use schedule::Schedule;
pub use task::{Task, TaskError};

/// Errors raised when registering tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule `{expr}`: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("task `{0}` is already registered")]
    Duplicate(String),

    #[error("task `{name}` failed to initialize: {source}")]
    Init {
        name: String,
        #[source]
        source: TaskError,
    },
}

struct Entry {
    task: Task,
    schedule: Schedule,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Entry {
    fn arm(&mut self) {
        if self.handle.is_none() {
            self.handle = Some(spawn_loop(
                self.task.clone(),
                self.schedule.clone(),
                self.cancel.clone(),
            ));
        }
    }

    async fn retire(self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
        if self.task.has_cleanup() {
            tracing::debug!(name = %self.task.name(), "Cleaning up task");
        }
        self.task.cleanup().await;
    }
}

fn spawn_loop(task: Task, schedule: Schedule, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(wait) = schedule.until_next() else {
                tracing::warn!(name = %task.name(), "Schedule has no upcoming run, parking task");
                break;
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            tracing::debug!(name = %task.name(), "Running scheduled task");
            task.run().await;
        }
    })
}

/// Registry of named periodic tasks.
#[derive(Default)]
pub struct Scheduler {
    tasks: DashMap<String, Entry>,
    running: Mutex<bool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, running its init hook first.
    ///
    /// The task starts firing immediately if the scheduler is running.
    pub async fn add_task(&self, task: Task) -> Result<(), SchedulerError> {
        let schedule = Schedule::parse(task.schedule())?;
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            return Err(SchedulerError::Duplicate(name));
        }

        task.init().await.map_err(|source| SchedulerError::Init {
            name: name.clone(),
            source,
        })?;

        let mut entry = Entry {
            task: task.clone(),
            schedule,
            cancel: CancellationToken::new(),
            handle: None,
        };

        let duplicate = {
            let running = self.running.lock();
            match self.tasks.entry(name.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => true,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    if *running {
                        entry.arm();
                    }
                    slot.insert(entry);
                    false
                }
            }
        };
        if duplicate {
            task.cleanup().await;
            return Err(SchedulerError::Duplicate(name));
        }

        tracing::info!(name = %name, schedule = %task.schedule(), "Task scheduled");
        Ok(())
    }

    /// Unregister a task and run its cleanup hook.
    ///
    /// Returns false if no task with that name was registered.
    pub async fn remove_task(&self, name: &str) -> bool {
        let Some((_, entry)) = self.tasks.remove(name) else {
            return false;
        };
        entry.retire().await;
        tracing::info!(name = %name, "Task removed");
        true
    }

    /// Begin firing every registered task.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if *running {
            return;
        }
        *running = true;
        for mut entry in self.tasks.iter_mut() {
            entry.arm();
        }
        tracing::info!(tasks = self.tasks.len(), "Scheduler started");
    }

    /// Stop every task and run each cleanup hook once.
    ///
    /// The registry is empty afterwards.
    pub async fn stop(&self) {
        *self.running.lock() = false;
        tracing::info!("Scheduler stopped");

        let names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, entry)) = self.tasks.remove(&name) {
                entry.retire().await;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}
