//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for a target
//!     → pool.rs (Router::next)
//!         → round_robin.rs (claim next slot)
//!         → skip backends the health map marks Unhealthy
//!     → backend.rs (immutable address handed back)
//!
//! Health prober / dispatcher report outcomes
//!     → Router::mark_failed / Router::mark_recovered
//! ```
//!
//! # Design Decisions
//! - The backend list is fixed at construction and read without locking
//! - Health flags live in one map behind a reader/writer lock
//! - The router never retries; it only exposes state

pub mod backend;
pub mod pool;
pub mod round_robin;

use thiserror::Error;

pub use backend::{Backend, BackendStatus};
pub use pool::Router;

/// Errors produced by backend selection and router construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// No backends are configured.
    #[error("no available backends")]
    NoAvailableBackends,

    /// Every configured backend is currently marked failed.
    #[error("all backends are down")]
    AllBackendsDown,

    /// A configured address could not be used.
    #[error("invalid backend address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Backend selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
}

impl Algorithm {
    /// Resolve a configured algorithm name. Unknown names fall back to
    /// round-robin.
    pub fn from_name(name: &str) -> Self {
        match name {
            "round_robin" => Algorithm::RoundRobin,
            other => {
                tracing::warn!(
                    algorithm = %other,
                    "Unsupported balancing algorithm, falling back to round_robin"
                );
                Algorithm::RoundRobin
            }
        }
    }
}
