//! Network layer.
//!
//! # Data Flow
//! ```text
//! TcpListener
//!     → listener.rs (accept, wrap in idle-timeout stream)
//!     → axum::serve (HTTP/1.1 and HTTP/2)
//! ```

pub mod listener;

pub use listener::{IdleTimeoutListener, IdleTimeoutStream};
