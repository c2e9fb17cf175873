//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probes (active.rs):
//!     PeriodicTask tick
//!     → list backends from the router
//!     → probe each in parallel (bounded, per-probe timeout)
//!     → Router::mark_recovered / Router::mark_failed
//!
//! Request path:
//!     Forwarding transport error
//!     → Router::mark_failed (dispatcher)
//!
//! State machine (state.rs):
//!     Unknown → Healthy ⇄ Unhealthy
//! ```
//!
//! # Design Decisions
//! - Only probes bring a backend back; the request path never does
//! - Backend HTTP error statuses on client traffic are not health signals
//! - A round finishes before the next one starts

pub mod active;
pub mod state;

pub use active::{HealthProber, ProbeError, ProbeRound};
pub use state::HealthState;
