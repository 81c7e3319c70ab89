//! Liveness endpoint.
//!
//! `GET /health` answers 200 while the listener is accepting connections.
//! It does not touch the seen set or the verifier.

use axum::http::StatusCode;

/// Health check handler.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
