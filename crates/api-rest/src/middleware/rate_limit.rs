//! Sensitive-path rate-limit gate.
//!
//! Runs before route classification so authentication paths that live under
//! public prefixes are still limited, and before the session gate so blocked
//! requests never reach auth. The wall clock is read once per request; store
//! arithmetic, audit logging and header derivation all see the same instant.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use mercadito_infrastructure::RateLimitDecision;
use serde_json::json;

use crate::middleware::route_policy;
use crate::state::AppState;

/// 429 body for IP-keyed gates
pub const TOO_MANY_ATTEMPTS: &str = "Demasiados intentos. Intenta de nuevo más tarde.";

/// Window size for the matched policy
pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Attempts left in the current window
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Epoch seconds at which the window resets
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Gate sensitive authentication paths by client IP before they reach
/// their handlers. Non-sensitive paths pass through untouched.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(policy) = route_policy::sensitive_policy(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };

    let ip = route_policy::client_ip(req.headers());
    let now = Utc::now();
    let decision = state.limiter.check_at(policy, &ip, now).await;

    if !decision.success {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": TOO_MANY_ATTEMPTS })),
        )
            .into_response();
        apply_rate_limit_headers(response.headers_mut(), &decision, now);
        return response;
    }

    // A handler may have attached headers from a more specific policy
    // (per-account sign-in); leave those in place.
    let mut response = next.run(req).await;
    if !response.headers().contains_key(&X_RATE_LIMIT_LIMIT) {
        apply_rate_limit_headers(response.headers_mut(), &decision, now);
    }
    response
}

/// Attach `X-RateLimit-*` headers derived from one decision. `now` must be
/// the instant the decision was computed with. Blocked decisions also get
/// `Retry-After`, rounded up to whole seconds.
pub fn apply_rate_limit_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    now: DateTime<Utc>,
) {
    let reset_secs = ceil_millis_to_secs(decision.reset.timestamp_millis());
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(reset_secs));

    if !decision.success {
        let wait_ms = (decision.reset - now).num_milliseconds().max(0);
        headers.insert(
            http::header::RETRY_AFTER,
            HeaderValue::from(ceil_millis_to_secs(wait_ms)),
        );
    }
}

fn ceil_millis_to_secs(millis: i64) -> i64 {
    (millis + 999).div_euclid(1000)
}
