//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (normalize derived settings)
//!     → validation.rs (semantic checks)
//!     → ServerConfig / ClientConfig (validated, immutable)
//!     → handed to each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_client_config, load_server_config, ConfigError};
pub use schema::{
    Addition, ClientConfig, ConfigOverrides, DynamicPortConfig, LogConfig, LogFormat,
    ObservabilityConfig, ProcessConfig, ServerConfig, SubscriptionConfig, TimeoutConfig,
};
