//! Mercadito REST API
//!
//! This crate provides the Axum-based REST API for the Mercadito marketplace.
//! Every request passes through correlation-context, logging, rate-limiting
//! and session-authentication middleware before reaching its handler.
//!
//! ## Architecture
//!
//! The API is organized into the following modules:
//!
//! - **app**: Application builder and middleware assembly
//! - **routes**: HTTP route handlers organized by domain
//! - **middleware**: Request/response middleware (correlation, logging, rate limiting, auth)
//! - **auth**: Session verification for protected routes
//! - **error**: Error classification, sanitization, and response envelopes
//! - **state**: Shared application state and dependency injection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mercadito_api_rest::{create_app, ApiConfig, AppState};
//! use mercadito_common::{Logger, LoggerConfig, RuntimeMode};
//! use mercadito_infrastructure::{RateLimitConfig, RateLimiter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mode = RuntimeMode::from_env();
//!     let config = ApiConfig::from_env().expect("Failed to load config");
//!     let logger = Arc::new(Logger::new(LoggerConfig::from_env_with_mode(mode)));
//!     let limiter =
//!         Arc::new(RateLimiter::connect(&RateLimitConfig::from_env(), logger.clone()).await);
//!
//!     let app = create_app(AppState::new(config, mode, logger, limiter));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
//!         .await
//!         .expect("Failed to bind");
//!
//!     axum::serve(listener, app)
//!         .await
//!         .expect("Server error");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use app::create_app;
pub use config::ApiConfig;
pub use error::{ErrorKind, ErrorResponder, RequestError};
pub use state::AppState;
