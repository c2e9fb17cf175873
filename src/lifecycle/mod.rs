//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → HttpServer::new → HttpServer::run
//!         → prober and sweeper start as PeriodicTasks (task.rs)
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → stop prober → stop sweeper
//!         → stop accepting → drain connections (bounded) → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any construction error is fatal
//! - Background tasks stop before listeners drain
//! - Every wait during shutdown has a deadline

pub mod shutdown;
pub mod signals;
pub mod task;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use task::PeriodicTask;
