//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing span)
//!     → dispatcher.rs (admission → backend selection → forward)
//!     → forward.rs (URI rewrite, header hygiene, bounded exchange)
//!     → response.rs (429/503 for requests that got no backend answer)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchError, Dispatcher};
pub use forward::{ForwardError, Forwarder, HyperForwarder};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, StartupError};
