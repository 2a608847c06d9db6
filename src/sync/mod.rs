//! Client-side synchronization.
//!
//! # Data Flow
//! ```text
//! sync()
//!     → fetch upstream /sub?token=... (mandatory; any failure aborts, no write)
//!     → fetch additions (optional; at most 3 in flight, failures skipped)
//!     → local prepend rules ahead of everything
//!     → overrides.rs (set fields replace, unset fields keep)
//!     → overwrite the document on disk
//!     → reload hook (failure logged only)
//! ```

pub mod overrides;
pub mod syncer;

use std::path::PathBuf;

use thiserror::Error;

use crate::subscription::FetchError;

pub use overrides::apply_overrides;
pub use syncer::{ReloadError, Syncer};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] FetchError),

    #[error("upstream fetch failed: {0}")]
    Upstream(#[source] FetchError),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
