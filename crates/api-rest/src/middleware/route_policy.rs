//! Route classification and client identification.
//!
//! Classification mirrors the deployment's access model: a fixed allow-list
//! of fully public prefixes, a small set of paths public only for specific
//! methods, and everything else protected. Sensitive authentication paths
//! additionally map to a rate-limit policy, checked before any of this.

use http::{HeaderMap, Method};
use mercadito_infrastructure::RateLimitPolicy;

/// Paths reachable without a session, matched by prefix
const PUBLIC_PREFIXES: &[&str] = &[
    "/api/auth",
    "/api/health",
    "/api/test-db",
    "/api/categorias-productos",
];

/// Paths public only for the listed method, matched by prefix
const PUBLIC_BY_METHOD: &[(&str, &str)] = &[
    ("/api/productos", "GET"),
    ("/api/products", "GET"),
    ("/api/negocios", "GET"),
    ("/api/planes-suscripcion", "GET"),
    ("/api/usuarios", "POST"),
];

/// Whether the path is fully public
pub fn is_public(path: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Whether the path is public for this method
pub fn is_public_for(method: &Method, path: &str) -> bool {
    PUBLIC_BY_METHOD
        .iter()
        .any(|(prefix, allowed)| path.starts_with(prefix) && method.as_str() == *allowed)
}

/// Rate-limit policy guarding a sensitive authentication path, if any
pub fn sensitive_policy(method: &Method, path: &str) -> Option<RateLimitPolicy> {
    if method == Method::POST && path == "/api/auth/signin" {
        return Some(RateLimitPolicy::Login);
    }
    if path.starts_with("/api/auth/callback") {
        return Some(RateLimitPolicy::OAuth);
    }
    if method == Method::POST && path == "/api/usuarios" {
        return Some(RateLimitPolicy::Register);
    }
    if method == Method::POST
        && (path == "/api/auth/password/forgot" || path == "/api/auth/password/reset")
    {
        return Some(RateLimitPolicy::PasswordReset);
    }
    None
}

/// Client IP as reported by the proxy chain, falling back to loopback
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    for name in ["x-real-ip", "x-client-ip"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    "127.0.0.1".to_string()
}
