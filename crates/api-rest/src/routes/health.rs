//! Health check endpoint.

use crate::error::success_response;
use crate::state::AppState;
use axum::{extract::State, response::Response, routing::get, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Selected rate-limit backend (`redis` or `memory`)
    pub rate_limit_backend: String,
}

/// Health check routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

/// Basic health check, reporting version and the rate-limit backend in use
async fn health(State(state): State<AppState>) -> Response {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rate_limit_backend: state.limiter.backend().to_string(),
    };
    success_response(response, StatusCode::OK)
}
