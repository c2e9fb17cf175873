//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket; reject with 429)
//!     → Pass to backend selection
//!
//! Forwarded request / relayed response:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-For)
//! ```
//!
//! # Design Decisions
//! - Admission is decided before any backend is touched
//! - Rate limit state is per process and never persisted

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{ClientLimit, RateLimiter};
