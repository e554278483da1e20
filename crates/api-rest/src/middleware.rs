//! HTTP middleware components.
//!
//! This module provides the request-processing layers, outermost first:
//! - Correlation context seeding and response stamping
//! - Request/response logging
//! - Rate-limit gating of sensitive authentication paths
//! - Session auth for protected routes

pub mod auth;
pub mod correlation;
pub mod logging;
pub mod rate_limit;
pub mod route_policy;

pub use auth::auth_middleware;
pub use correlation::correlation_middleware;
pub use logging::logging_middleware;
pub use rate_limit::{apply_rate_limit_headers, rate_limit_middleware, TOO_MANY_ATTEMPTS};
