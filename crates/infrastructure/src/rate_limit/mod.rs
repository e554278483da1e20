//! Rate limiting for authentication-sensitive endpoints.
//!
//! Limits are expressed as named policies (requests per window, keyed by
//! client IP or normalized account email) checked against an injectable
//! store. Deployments with Redis get a distributed sliding window; without
//! it the in-process [`MemoryStore`] keeps limits per instance.
//!
//! The [`RateLimiter`] facade never surfaces store errors: a failing
//! backend logs the failure and allows the request with the full quota
//! (fail-open), so the limiter can only ever reject traffic, not break it.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mercadito_common::{LogContext, LoggedError, Logger};

use crate::Result;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Named limits applied to the authentication flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPolicy {
    /// Sign-in attempts per client IP.
    Login,
    /// Sign-in attempts per account email, across IPs.
    LoginPerAccount,
    /// OAuth callback hits per client IP.
    OAuth,
    /// Account registrations per client IP.
    Register,
    /// Password forgot/reset requests per client IP.
    PasswordReset,
}

impl RateLimitPolicy {
    /// Every policy, for iteration in tests and diagnostics
    pub const ALL: [RateLimitPolicy; 5] = [
        Self::Login,
        Self::LoginPerAccount,
        Self::OAuth,
        Self::Register,
        Self::PasswordReset,
    ];

    /// Policy name as it appears in audit log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginPerAccount => "loginPerAccount",
            Self::OAuth => "oauth",
            Self::Register => "register",
            Self::PasswordReset => "passwordReset",
        }
    }

    /// Key namespace, shared by every store backend.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginPerAccount => "login-account",
            Self::OAuth => "oauth",
            Self::Register => "register",
            Self::PasswordReset => "password-reset",
        }
    }

    /// Requests allowed per window
    pub fn max_requests(&self) -> u32 {
        match self {
            Self::Login => 5,
            Self::LoginPerAccount => 10,
            Self::OAuth => 10,
            Self::Register => 3,
            Self::PasswordReset => 3,
        }
    }

    /// Sliding window length
    pub fn window(&self) -> Duration {
        match self {
            Self::Login => Duration::minutes(10),
            Self::LoginPerAccount => Duration::hours(1),
            Self::OAuth => Duration::minutes(5),
            Self::Register => Duration::hours(1),
            Self::PasswordReset => Duration::hours(1),
        }
    }

    /// Store key for one identifier under this policy.
    pub fn key(&self, identifier: &str) -> String {
        format!("{}:{identifier}", self.prefix())
    }
}

impl std::fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub success: bool,
    /// Window size of the policy that was checked.
    pub limit: u32,
    /// Attempts left in the current window.
    pub remaining: u32,
    /// Instant the window resets.
    pub reset: DateTime<Utc>,
}

/// Storage backend for rate-limit counters.
///
/// `now` is snapshotted once per request by the caller so store math, audit
/// logs, and response headers all agree on the same instant.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one attempt for `identifier` under `policy` and decide
    /// whether it fits the window ending at `now`
    async fn check(
        &self,
        policy: RateLimitPolicy,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision>;
}

/// Which backend a [`RateLimiter`] ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Distributed sliding window in Redis.
    Redis,
    /// Per-instance in-process fallback.
    Memory,
}

impl BackendKind {
    /// Lowercase backend name for health reporting
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-limit backend configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Redis connection URL; absent means in-memory fallback.
    pub redis_url: Option<String>,
    /// Optional auth token, injected as the connection password.
    pub redis_token: Option<String>,
    /// Namespace prepended to every store key.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_token: None,
            key_prefix: "mercadito:".to_string(),
        }
    }
}

impl RateLimitConfig {
    /// Read configuration from `RATE_LIMIT_REDIS_URL` and
    /// `RATE_LIMIT_REDIS_TOKEN`.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("RATE_LIMIT_REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_token: std::env::var("RATE_LIMIT_REDIS_TOKEN").ok().filter(|v| !v.is_empty()),
            ..Default::default()
        }
    }
}

/// Policy-aware rate limiter over an injectable store.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    backend: BackendKind,
    logger: Arc<Logger>,
}

impl RateLimiter {
    /// Limiter over an explicit store, used directly in tests
    pub fn with_store(
        store: Arc<dyn RateLimitStore>,
        backend: BackendKind,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            store,
            backend,
            logger,
        }
    }

    /// Select and connect the backend: Redis when configured, otherwise the
    /// per-instance memory store. Connection failures also fall back to
    /// memory so startup never aborts over the limiter.
    pub async fn connect(config: &RateLimitConfig, logger: Arc<Logger>) -> Self {
        if config.redis_url.is_some() {
            match RedisStore::connect(config).await {
                Ok(store) => {
                    logger.info("Rate limiting initialized with Redis", None).await;
                    return Self::with_store(Arc::new(store), BackendKind::Redis, logger);
                }
                Err(err) => {
                    logger
                        .error(
                            "Failed to initialize rate limiting backend",
                            Some(LoggedError::from_error(&err)),
                            None,
                        )
                        .await;
                }
            }
        } else {
            logger
                .warn(
                    "Rate limiting: Redis credentials not found. Using in-memory fallback \
                     (not recommended for production)",
                    None,
                )
                .await;
        }
        Self::with_store(Arc::new(MemoryStore::new()), BackendKind::Memory, logger)
    }

    /// Backend selected at construction
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Check `identifier` against `policy` at the current instant.
    pub async fn check(&self, policy: RateLimitPolicy, identifier: &str) -> RateLimitDecision {
        self.check_at(policy, identifier, Utc::now()).await
    }

    /// Check at an explicit instant. Blocked attempts are audited at warn;
    /// store failures are logged and converted into a full-quota allowance.
    pub async fn check_at(
        &self,
        policy: RateLimitPolicy,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        match self.store.check(policy, identifier, now).await {
            Ok(decision) => {
                if !decision.success {
                    self.logger
                        .warn(
                            format!(
                                "Rate limit blocked: {} for {identifier} - limit exceeded",
                                policy.name()
                            ),
                            Some(
                                LogContext::new()
                                    .set("policy", policy.name())
                                    .set("identifier", identifier)
                                    .set("limit", decision.limit),
                            ),
                        )
                        .await;
                }
                decision
            }
            Err(err) => {
                self.logger
                    .error(
                        format!("Rate limit check failed for {}", policy.key(identifier)),
                        Some(LoggedError::from_error(&err)),
                        Some(
                            LogContext::new()
                                .set("policy", policy.name())
                                .set("identifier", identifier),
                        ),
                    )
                    .await;
                RateLimitDecision {
                    success: true,
                    limit: policy.max_requests(),
                    remaining: policy.max_requests(),
                    reset: now + policy.window(),
                }
            }
        }
    }
}
