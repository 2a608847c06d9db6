//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → ring pool + NAT task → subscription engine
//!     → scheduler start → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → scheduler stop (cleanup hooks) → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: tasks are registered (and initialized) before serving
//! - Ordered shutdown: the listener drains first, then NAT rules are removed

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
pub use startup::{ServerApp, StartupError};
