//! Session gate for protected routes.
//!
//! Public and public-by-method paths pass through untouched. Everything else
//! requires the session-auth provider to accept the request; the resulting
//! session is stored in request extensions and its user id merged into the
//! correlation context so downstream log entries carry it.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
};
use mercadito_common::{context, LogContext};

use crate::error::AUTHENTICATION_REQUIRED;
use crate::middleware::route_policy;
use crate::state::AppState;

/// Middleware that rejects unauthenticated access to protected routes
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if route_policy::is_public(&path) || route_policy::is_public_for(&method, &path) {
        return next.run(req).await;
    }

    match state.session_auth.authenticate(req.headers()).await {
        Ok(session) => {
            context::enter_with(LogContext::new().set("userId", session.user_id.clone()));
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(error) => {
            let ctx = LogContext::new()
                .set("endpoint", path.as_str())
                .set("method", method.as_str())
                .set("reason", error.to_string())
                .set("type", "unauthorized_attempt");
            state
                .logger
                .warn(format!("Unauthorized access attempt to {method} {path}"), Some(ctx))
                .await;
            state
                .responder
                .authentication_error(AUTHENTICATION_REQUIRED)
                .await
        }
    }
}
