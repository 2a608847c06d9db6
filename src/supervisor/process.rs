//! Restart-always process supervisor.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessConfig;
use crate::observability::metrics;
use crate::supervisor::output::tee;
use crate::supervisor::SupervisorError;

const DEFAULT_ERROR_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_EXIT_DELAY: Duration = Duration::from_secs(1);

/// What to launch and how long to wait between launches.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub bin_path: PathBuf,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    pub args: Vec<String>,
    /// Delay before relaunching after a failed exit or launch.
    pub error_delay: Duration,
    /// Delay before relaunching after a clean exit.
    pub exit_delay: Duration,
}

impl SupervisorConfig {
    pub fn new(
        bin_path: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            bin_path: bin_path.into(),
            work_dir: work_dir.into(),
            log_path: log_path.into(),
            args,
            error_delay: DEFAULT_ERROR_DELAY,
            exit_delay: DEFAULT_EXIT_DELAY,
        }
    }

    pub fn with_delays(mut self, error_delay: Duration, exit_delay: Duration) -> Self {
        self.error_delay = error_delay;
        self.exit_delay = exit_delay;
        self
    }
}

impl From<&ProcessConfig> for SupervisorConfig {
    fn from(config: &ProcessConfig) -> Self {
        Self::new(
            &config.bin_path,
            &config.work_dir,
            &config.log_path,
            config.args.clone(),
        )
    }
}

#[derive(Default)]
struct State {
    running: bool,
    generation: u64,
    pid: Option<u32>,
    lifetime: Option<CancellationToken>,
}

struct Inner {
    config: SupervisorConfig,
    state: Mutex<State>,
    starts: AtomicU64,
}

/// Keeps one child process alive until stopped.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                starts: AtomicU64::new(0),
            }),
        }
    }

    /// Launch the supervisory loop under a lifetime derived from `parent`.
    ///
    /// A no-op while the loop is already running.
    pub fn start(&self, parent: &CancellationToken) {
        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }
        state.running = true;
        state.generation += 1;
        let lifetime = parent.child_token();
        state.lifetime = Some(lifetime.clone());

        let inner = self.inner.clone();
        let generation = state.generation;
        tokio::spawn(async move { inner.supervise(lifetime, generation).await });
    }

    /// Ask the running child to reload its configuration in place.
    pub fn reload(&self) -> Result<(), SupervisorError> {
        let state = self.inner.state.lock();
        let pid = state.pid.ok_or(SupervisorError::NotRunning)?;
        tracing::info!(pid, "Sending reload signal to process");
        signal::reload(pid)
    }

    /// Stop relaunching and interrupt the child without waiting for it.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(lifetime) = state.lifetime.take() {
            lifetime.cancel();
        }
        if let Some(pid) = state.pid {
            tracing::info!(pid, "Terminating process");
            if let Err(e) = signal::interrupt(pid) {
                tracing::warn!(pid, error = %e, "Failed to interrupt process");
            }
        }
        state.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Pid of the live child, if one is currently tracked.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().pid
    }

    /// Number of successful launches so far.
    pub fn start_count(&self) -> u64 {
        self.inner.starts.load(Ordering::SeqCst)
    }
}

impl Inner {
    async fn supervise(&self, lifetime: CancellationToken, generation: u64) {
        loop {
            let delay = match self.run_once(&lifetime, generation).await {
                Ok(None) => break,
                Ok(Some(status)) if status.success() => {
                    tracing::info!("Process exited gracefully");
                    metrics::record_process_exit("clean");
                    self.config.exit_delay
                }
                Ok(Some(status)) => {
                    tracing::error!(status = %status, "Process exited with error");
                    metrics::record_process_exit("error");
                    self.config.error_delay
                }
                Err(e) => {
                    tracing::error!(error = %e, "Process failed to run");
                    metrics::record_process_exit("launch_failed");
                    self.config.error_delay
                }
            };

            if lifetime.is_cancelled() {
                break;
            }
            tracing::info!(delay = ?delay, "Restarting process");
            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut state = self.state.lock();
        if state.generation == generation {
            state.running = false;
            state.lifetime = None;
        }
        tracing::info!("Process supervisor stopped");
    }

    /// Launch the child once and wait for it to exit.
    ///
    /// `Ok(None)` means the lifetime ended before launch.
    async fn run_once(
        &self,
        lifetime: &CancellationToken,
        generation: u64,
    ) -> Result<Option<ExitStatus>, SupervisorError> {
        let bin_path = std::path::absolute(&self.config.bin_path)?;
        let work_dir = std::path::absolute(&self.config.work_dir)?;
        let log_path = std::path::absolute(&self.config.log_path)?;

        let log_file = open_log(&log_path).await?;

        let mut child = {
            let mut state = self.state.lock();
            if lifetime.is_cancelled() {
                return Ok(None);
            }
            let child = Command::new(&bin_path)
                .args(&self.config.args)
                .current_dir(&work_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;
            state.pid = child.id();
            self.starts.fetch_add(1, Ordering::SeqCst);
            child
        };
        metrics::record_process_start();
        tracing::info!(
            bin = %bin_path.display(),
            work_dir = %work_dir.display(),
            pid = ?child.id(),
            "Process starting"
        );

        let log_file = Arc::new(tokio::sync::Mutex::new(log_file));
        let mut copiers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            copiers.push(tokio::spawn(tee(stdout, log_file.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            copiers.push(tokio::spawn(tee(stderr, log_file)));
        }

        let status = child.wait().await;
        {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.pid = None;
            }
        }
        for copier in copiers {
            let _ = copier.await;
        }
        Ok(Some(status?))
    }
}

async fn open_log(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

#[cfg(unix)]
mod signal {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    use crate::supervisor::SupervisorError;

    fn send(pid: u32, sig: Signal) -> Result<(), SupervisorError> {
        let pid = i32::try_from(pid).map_err(|_| SupervisorError::NotRunning)?;
        kill(Pid::from_raw(pid), sig).map_err(|e| SupervisorError::Signal(e.into()))
    }

    pub fn reload(pid: u32) -> Result<(), SupervisorError> {
        send(pid, Signal::SIGHUP)
    }

    pub fn interrupt(pid: u32) -> Result<(), SupervisorError> {
        send(pid, Signal::SIGINT)
    }
}

#[cfg(not(unix))]
mod signal {
    use crate::supervisor::SupervisorError;

    pub fn reload(_pid: u32) -> Result<(), SupervisorError> {
        Err(SupervisorError::Unsupported)
    }

    pub fn interrupt(_pid: u32) -> Result<(), SupervisorError> {
        Err(SupervisorError::Unsupported)
    }
}
