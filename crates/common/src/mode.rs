//! Runtime mode detection.
//!
//! Components that behave differently in production (console output, error
//! message sanitization, stack capture) take an explicit [`RuntimeMode`] at
//! construction instead of reading the environment at each call site.

use serde::{Deserialize, Serialize};

/// Deployment mode of the running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Local development: colorized console logging, verbose error bodies.
    Development,
    /// Production: file-only logging, sanitized error bodies.
    Production,
}

impl RuntimeMode {
    /// Read the mode from `APP_ENV`. Anything other than `production`
    /// (case-insensitive) is treated as development.
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV") {
            Ok(value) if value.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Whether the service runs in production
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether the service runs in development
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl Default for RuntimeMode {
    fn default() -> Self {
        Self::Development
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}
