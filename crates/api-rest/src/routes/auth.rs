//! Authentication-flow endpoints.
//!
//! These live under the public `/api/auth` prefix; the middleware's
//! rate-limit gate still applies per IP. Sign-in adds its own per-account
//! check on the normalized email, since only the handler sees the payload.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use http::StatusCode;
use mercadito_common::{context, LogContext};
use mercadito_infrastructure::RateLimitPolicy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::error::success_response;
use crate::middleware::apply_rate_limit_headers;
use crate::state::AppState;

/// 429 body for the per-account sign-in gate
pub const TOO_MANY_ACCOUNT_ATTEMPTS: &str =
    "Demasiados intentos para este email. Intenta de nuevo más tarde.";

/// Anti-enumeration response for password reset requests
const FORGOT_RESPONSE: &str =
    "Si el email está registrado, recibirás instrucciones para restablecer tu contraseña";

const INVALID_CREDENTIALS: &str = "Credenciales inválidas. Verifica tu email y contraseña.";

/// Sign-in request
#[derive(Debug, Deserialize, Validate)]
pub struct SigninRequest {
    #[validate(email(message = "Email inválido"))]
    pub email: String,

    #[validate(length(min = 1, message = "La contraseña es requerida"))]
    pub password: String,
}

/// Established session payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
}

/// Password reset request
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotRequest {
    #[validate(email(message = "Email inválido"))]
    pub email: String,
}

/// Password reset submission
#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(length(min = 1, message = "Token inválido"))]
    pub token: String,

    #[validate(length(
        min = 8,
        max = 255,
        message = "La contraseña debe tener al menos 8 caracteres"
    ))]
    pub password: String,
}

/// Authentication-flow routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/password/forgot", post(forgot))
        .route("/api/auth/password/reset", post(reset))
}

/// Credential sign-in with a per-account sliding window
async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return state
                .responder
                .validation_error(
                    "Datos inválidos",
                    Some(json!({ "message": rejection.body_text() })),
                )
                .await;
        }
    };

    if let Err(errors) = payload.validate() {
        return state.responder.handle(errors.into()).await;
    }

    let email = payload.email.to_lowercase();
    let now = Utc::now();
    let decision = state
        .limiter
        .check_at(RateLimitPolicy::LoginPerAccount, &email, now)
        .await;

    if !decision.success {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": TOO_MANY_ACCOUNT_ATTEMPTS })),
        )
            .into_response();
        apply_rate_limit_headers(response.headers_mut(), &decision, now);
        return response;
    }

    match state
        .session_auth
        .verify_credentials(&email, &payload.password)
        .await
    {
        Ok(session) => {
            context::enter_with(LogContext::new().set("userId", session.user_id.clone()));
            let ctx = LogContext::new()
                .set("email", session.email.clone())
                .set("type", "signin");
            state.logger.info("User signed in", Some(ctx)).await;

            let mut response = success_response(
                SessionResponse {
                    user_id: session.user_id,
                    email: session.email,
                },
                StatusCode::OK,
            );
            apply_rate_limit_headers(response.headers_mut(), &decision, now);
            response
        }
        Err(error) => {
            let ctx = LogContext::new()
                .set("email", email.clone())
                .set("reason", error.to_string())
                .set("type", "signin_failed");
            state
                .logger
                .warn(format!("Sign-in failed for {email}"), Some(ctx))
                .await;

            let mut response = state
                .responder
                .authentication_error(INVALID_CREDENTIALS)
                .await;
            apply_rate_limit_headers(response.headers_mut(), &decision, now);
            response
        }
    }
}

/// Password reset request. Always answers 200 so account existence cannot
/// be probed.
async fn forgot(
    State(state): State<AppState>,
    payload: Result<Json<ForgotRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return state
                .responder
                .validation_error(
                    "Datos inválidos",
                    Some(json!({ "message": rejection.body_text() })),
                )
                .await;
        }
    };

    if let Err(errors) = payload.validate() {
        return state.responder.handle(errors.into()).await;
    }

    let email = payload.email.to_lowercase();
    let user_exists = state.usuarios.find_by_email(&email).is_some();
    let ctx = LogContext::new()
        .set("email", email)
        .set("userExists", user_exists)
        .set("type", "password_reset_request");
    state
        .logger
        .info("Password reset request processed", Some(ctx))
        .await;

    (StatusCode::OK, Json(json!({ "message": FORGOT_RESPONSE }))).into_response()
}

/// Password reset submission. Token verification needs the token store;
/// without one every token is reported invalid or expired.
async fn reset(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return state
                .responder
                .validation_error(
                    "Datos inválidos",
                    Some(json!({ "message": rejection.body_text() })),
                )
                .await;
        }
    };

    if let Err(errors) = payload.validate() {
        return state.responder.handle(errors.into()).await;
    }

    let ctx = LogContext::new().set("type", "password_reset_rejected");
    state
        .logger
        .warn("Password reset attempt with invalid or expired token", Some(ctx))
        .await;
    state
        .responder
        .validation_error("Token inválido o expirado", None)
        .await
}
