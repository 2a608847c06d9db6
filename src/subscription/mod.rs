//! Server-side configuration synthesis.
//!
//! # Data Flow
//! ```text
//! GET /sub (token already validated)
//!     → engine.rs generate_config
//!         → base document (cached by file mtime, cloned per caller)
//!         → port rewrite from the ring pool (per proxy, independent draws)
//!         → dependency set (cached with absolute 5-minute expiry)
//!             → fetch.rs, one request per addition, at most 5 in flight
//!         → append proxies/groups, prepend rules
//!     → (document, accounting string)
//! ```
//!
//! # Design Decisions
//! - Callers always receive owned clones; cached documents are never handed out
//! - A failing addition only drops its own contribution
//! - Expiry is lazy: nothing refreshes the cache in the background

pub mod engine;
pub mod fetch;

use std::path::PathBuf;

use thiserror::Error;

pub use engine::{DependencySet, SubscriptionService, DEPENDENCY_TTL, ZERO_USAGE};
pub use fetch::{fetch_document, FetchError, FetchedDocument};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("failed to stat base document {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read base document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed base document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}
