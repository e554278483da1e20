//! Infrastructure layer for the Mercadito platform.
//!
//! This crate provides the abuse-control backend:
//! - Named rate-limit policies for authentication-sensitive endpoints
//! - A distributed sliding-window store backed by Redis
//! - An in-process fallback store for deployments without Redis
//! - A fail-open facade that audits blocked attempts through the
//!   structured logger
//!
//! ## Architecture
//!
//! Stores implement the [`rate_limit::RateLimitStore`] trait so the backend
//! can be swapped for testing or single-instance deployments. The
//! [`rate_limit::RateLimiter`] facade owns backend selection, failure
//! handling, and audit logging; callers never deal with store errors.

pub mod rate_limit;

// Re-export commonly used types
pub use rate_limit::{
    BackendKind, MemoryStore, RateLimitConfig, RateLimitDecision, RateLimitPolicy,
    RateLimitStore, RateLimiter, RedisStore,
};

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backend errors from Redis
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Cache(_))
    }
}
