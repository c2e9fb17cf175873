//! Error responses.
//!
//! Clients see short plain-text bodies; the detail stays in the logs.
//!
//! | Failure                   | Status | Body                     |
//! |---------------------------|--------|--------------------------|
//! | admission rejected        | 429    | `rate limit exceeded`    |
//! | no selectable backend     | 503    | router error text        |
//! | backend timeout/transport | 503    | `service unavailable`    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::dispatcher::DispatchError;

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
            }
            DispatchError::NoBackend(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
            DispatchError::Forwarding { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service unavailable").into_response()
            }
        }
    }
}
