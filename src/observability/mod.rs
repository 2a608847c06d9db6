//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one subscriber per process)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout or an append-only log file, text or JSON
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Components log under their own module target instead of owning sinks
//! - Metric updates go through the `metrics` facade and are no-ops until
//!   an exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
