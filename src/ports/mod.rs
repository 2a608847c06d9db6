//! Dynamic decoy port subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler tick
//!     → rotation.rs (evict oldest, draw fresh port)
//!     → nat.rs (delete old REDIRECT, add new REDIRECT)
//!     → ring.rs (dequeue / enqueue)
//!
//! Subscription request
//!     → ring.rs draw (weighted toward newest port)
//!     → rewritten into each proxy's port field
//! ```
//!
//! # Design Decisions
//! - Only one rotation lifecycle per running instance
//! - Ports are unique while resident
//! - The pool is rebuilt from scratch on every start

pub mod nat;
pub mod ring;
pub mod rotation;

pub use nat::{Iptables, NatError, NatLifecycle, NatState, RedirectAction, RuleRunner};
pub use ring::RingPool;
pub use rotation::DynamicPortService;
