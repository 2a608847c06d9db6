//! Supervision of the proxy binary.
//!
//! # Data Flow
//! ```text
//! start(parent lifetime)
//!     → process.rs (derived lifetime, supervisory loop)
//!     → spawn child (stdin null, stdout/stderr piped)
//!     → output.rs (tee each stream to console + append-mode log file)
//!     → wait for exit → fixed delay → relaunch
//!
//! reload() → SIGHUP to the tracked child
//! stop()   → cancel lifetime, SIGINT to the tracked child (no wait)
//! ```
//!
//! # Design Decisions
//! - Restart-always: every exit is retried on a fixed delay, with no cap
//! - The child's wait is never interrupted by cancellation; the loop ends
//!   once the child actually exits
//! - The tracked pid and running flag share one mutex with the launch step,
//!   so a stop can never slip between the cancellation check and a spawn

pub mod output;
pub mod process;

use thiserror::Error;

pub use process::{ProcessSupervisor, SupervisorConfig};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("process is not running")]
    NotRunning,

    #[error("failed to signal process: {0}")]
    Signal(#[source] std::io::Error),

    #[error("signals are not supported on this platform")]
    Unsupported,

    #[error("failed to launch process: {0}")]
    Io(#[from] std::io::Error),
}
