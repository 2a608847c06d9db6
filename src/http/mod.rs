//! HTTP surface for subscribers.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, timeout, tracing layers)
//!     → auth.rs (token query parameter checked against the token set)
//!     → subscription.rs (generate document, attach client headers)
//!     → YAML body back to the client
//! ```

pub mod auth;
pub mod server;
pub mod subscription;

pub use server::{AppState, HttpServer};
