//! Proxy configuration document model.
//!
//! # Data Flow
//! ```text
//! remote source / base file (YAML)
//!     → document.rs (deserialize into ConfigDocument)
//!     → subscription engine / syncer (merge, rewrite ports)
//!     → serialized back to YAML for the proxy binary
//! ```
//!
//! # Design Decisions
//! - Proxy records are opaque: only `name` and `port` are typed
//! - Every other proxy key is carried through verbatim
//! - Missing keys deserialize to zero values

pub mod document;

pub use document::{ConfigDocument, DnsConfig, FallbackFilter, Proxy, ProxyGroup, RuleProvider};
