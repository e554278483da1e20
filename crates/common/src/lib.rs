//! Shared request-scoped observability primitives for the Mercadito platform.
//!
//! This crate provides the foundations every service-facing crate builds on:
//! - Correlation context propagation across async request handling
//! - Structured JSON logging with file rotation
//! - Runtime mode detection (development vs. production)

pub mod context;
pub mod logger;
pub mod mode;

// Re-export commonly used types
pub use context::{LogContext, CORRELATION_ID_HEADER};
pub use logger::{ConsoleSink, LogEntry, LogLevel, LoggedError, Logger, LoggerConfig, StdStreams};
pub use mode::RuntimeMode;
