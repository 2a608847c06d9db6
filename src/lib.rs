//! proxy-master: control plane for a proxy node.
//!
//! Synthesizes deployable proxy configuration from untrusted remote sources,
//! rotates a pool of decoy ports behind NAT redirects, and supervises the
//! proxy binary on the client side.

// Core subsystems
pub mod model;
pub mod ports;
pub mod scheduler;
pub mod subscription;
pub mod supervisor;
pub mod sync;

// Surfaces
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{ClientConfig, ServerConfig};
pub use lifecycle::{ServerApp, Shutdown};
pub use model::ConfigDocument;
pub use scheduler::{Scheduler, Task};
