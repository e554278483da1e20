//! HTTP error classification and response envelopes.
//!
//! Every handler failure funnels through [`ErrorResponder`]: the error is
//! classified against an ordered predicate table, the public message is
//! sanitized according to the runtime mode, the original error is logged,
//! and the client receives the stable JSON envelope
//! `{ error, type, details?, correlationId?, timestamp }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use mercadito_common::{context, LogContext, LoggedError, Logger, RuntimeMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use validator::ValidationErrors;

/// Default message for authentication failures
pub const AUTHENTICATION_REQUIRED: &str = "Autenticación requerida";

/// Default message for authorization failures
pub const PERMISSION_DENIED: &str = "No tienes permisos para realizar esta acción";

const DATABASE_GENERIC: &str =
    "Error en la base de datos. Por favor, inténtelo de nuevo más tarde.";
const EXTERNAL_SERVICE_GENERIC: &str =
    "Error en el servicio externo. Por favor, inténtelo de nuevo más tarde.";
const INTERNAL_GENERIC: &str =
    "Error interno del servidor. Por favor, contacte al administrador.";

/// Error taxonomy exposed to clients in the envelope `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request payload failed validation
    Validation,
    /// Missing or invalid credentials
    Authentication,
    /// Authenticated but not allowed
    Authorization,
    /// Requested resource does not exist
    NotFound,
    /// Datastore failure
    Database,
    /// Upstream dependency failure
    ExternalService,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable string form, matching the envelope `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::NotFound => "NOT_FOUND",
            Self::Database => "DATABASE",
            Self::ExternalService => "EXTERNAL_SERVICE",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status this kind maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Database => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalService => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report of a handler failure, carrying everything the classifier inspects
#[derive(Debug, Clone)]
pub struct RequestError {
    /// Error type name (e.g. `Error`, `ValidationErrors`)
    pub name: String,

    /// Raw message, never sent to clients unsanitized in production
    pub message: String,

    /// Store error code such as `ER_DUP_ENTRY`
    pub code: Option<String>,

    /// Field-level issues from payload validation
    pub validation: Option<Value>,
}

impl RequestError {
    /// Create a report from a bare message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            code: None,
            validation: None,
        }
    }

    /// Override the error name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a store error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Classify into the taxonomy. Predicates run in order; the first
    /// match wins. Message matching is case-insensitive.
    pub fn classify(&self) -> ErrorKind {
        if self.validation.is_some() {
            return ErrorKind::Validation;
        }

        if let Some(code) = &self.code {
            if code == "ER_DUP_ENTRY"
                || code == "ER_NO_REFERENCED_ROW_2"
                || code == "ER_ROW_IS_REFERENCED_2"
                || code.starts_with("ER_")
            {
                return ErrorKind::Database;
            }
        }

        let msg = self.message.to_lowercase();

        if msg.contains("duplicate entry") || msg.contains("foreign key constraint") {
            return ErrorKind::Database;
        }

        if msg.contains("unauthorized")
            || msg.contains("unauthenticated")
            || msg.contains("token")
            || msg.contains("jwt")
        {
            return ErrorKind::Authentication;
        }

        if msg.contains("forbidden")
            || msg.contains("permission")
            || msg.contains("access denied")
            || msg.contains("not allowed")
        {
            return ErrorKind::Authorization;
        }

        if msg.contains("not found")
            || msg.contains("does not exist")
            || msg.contains("no record found")
        {
            return ErrorKind::NotFound;
        }

        if msg.contains("network") || msg.contains("timeout") || msg.contains("service unavailable")
        {
            return ErrorKind::ExternalService;
        }

        ErrorKind::Internal
    }
}

impl From<ValidationErrors> for RequestError {
    fn from(errors: ValidationErrors) -> Self {
        Self {
            name: "ValidationErrors".to_string(),
            message: errors.to_string(),
            code: None,
            validation: serde_json::to_value(&errors).ok(),
        }
    }
}

/// JSON error envelope returned on every failure
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Sanitized public message
    pub error: String,

    /// Error taxonomy kind
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// Safe details (validation issues, or full detail in development)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// Correlation id of the failing request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// ISO-8601 instant the response was built
    pub timestamp: String,
}

/// JSON success envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody<T> {
    /// Response payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Correlation id of the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// ISO-8601 instant the response was built
    pub timestamp: String,
}

/// Build a success envelope around `data`
pub fn success_response<T: Serialize>(data: T, status: StatusCode) -> Response {
    let body = SuccessBody {
        data: Some(data),
        correlation_id: context::correlation_id(),
        timestamp: now_timestamp(),
    };
    (status, Json(body)).into_response()
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Classifies handler failures, logs them, and renders the envelope
pub struct ErrorResponder {
    logger: Arc<Logger>,
    mode: RuntimeMode,
}

impl ErrorResponder {
    /// Create a responder for the given runtime mode
    pub fn new(logger: Arc<Logger>, mode: RuntimeMode) -> Self {
        Self { logger, mode }
    }

    /// Handle an arbitrary failure: classify, log the original, respond
    /// with the sanitized envelope.
    pub async fn handle(&self, error: RequestError) -> Response {
        let kind = error.classify();
        let status = kind.status_code();
        let message = self.sanitize(&error, kind);
        let details = self.safe_details(&error);

        let mut logged = LoggedError::new(&error.name, &error.message);
        if let Some(code) = &error.code {
            logged = logged.with_code(code.clone());
        }
        let ctx = LogContext::new()
            .set("errorType", kind.as_str())
            .set("statusCode", status.as_u16())
            .set("type", "error");
        self.logger
            .error(format!("{kind}: {message}"), Some(logged), Some(ctx))
            .await;

        self.render(status, message, kind, details)
    }

    /// 400 with the caller's message and optional field issues
    pub async fn validation_error(
        &self,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Response {
        let message = message.into();
        let ctx = LogContext::new().set("type", "validation_error");
        self.logger
            .warn(format!("Validation error: {message}"), Some(ctx))
            .await;
        self.render(StatusCode::BAD_REQUEST, message, ErrorKind::Validation, details)
    }

    /// 401; pass [`AUTHENTICATION_REQUIRED`] for the default message
    pub async fn authentication_error(&self, message: impl Into<String>) -> Response {
        let message = message.into();
        let ctx = LogContext::new().set("type", "authentication_error");
        self.logger
            .warn(format!("Authentication error: {message}"), Some(ctx))
            .await;
        self.render(StatusCode::UNAUTHORIZED, message, ErrorKind::Authentication, None)
    }

    /// 403; pass [`PERMISSION_DENIED`] for the default message
    pub async fn authorization_error(&self, message: impl Into<String>) -> Response {
        let message = message.into();
        let ctx = LogContext::new().set("type", "authorization_error");
        self.logger
            .warn(format!("Authorization error: {message}"), Some(ctx))
            .await;
        self.render(StatusCode::FORBIDDEN, message, ErrorKind::Authorization, None)
    }

    /// 404 with `"{resource} no encontrado"`
    pub async fn not_found_error(&self, resource: &str) -> Response {
        let message = format!("{resource} no encontrado");
        let ctx = LogContext::new()
            .set("resource", resource)
            .set("type", "not_found_error");
        self.logger
            .warn(format!("Not found error: {message}"), Some(ctx))
            .await;
        self.render(StatusCode::NOT_FOUND, message, ErrorKind::NotFound, None)
    }

    /// 500 for a known datastore failure
    pub async fn database_error(
        &self,
        message: impl Into<String>,
        source: Option<LoggedError>,
    ) -> Response {
        let message = message.into();
        let ctx = LogContext::new().set("type", "database_error");
        self.logger
            .error(format!("Database error: {message}"), source, Some(ctx))
            .await;
        self.render(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            ErrorKind::Database,
            None,
        )
    }

    fn sanitize(&self, error: &RequestError, kind: ErrorKind) -> String {
        if self.mode.is_development() {
            return error.message.clone();
        }
        match kind {
            ErrorKind::Validation
            | ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::NotFound => error.message.clone(),
            ErrorKind::Database => DATABASE_GENERIC.to_string(),
            ErrorKind::ExternalService => EXTERNAL_SERVICE_GENERIC.to_string(),
            ErrorKind::Internal => INTERNAL_GENERIC.to_string(),
        }
    }

    fn safe_details(&self, error: &RequestError) -> Option<Value> {
        if let Some(issues) = &error.validation {
            return Some(issues.clone());
        }
        if self.mode.is_development() {
            let mut detail = json!({
                "name": error.name,
                "message": error.message,
            });
            if let Some(code) = &error.code {
                detail["code"] = json!(code);
            }
            return Some(detail);
        }
        None
    }

    fn render(
        &self,
        status: StatusCode,
        message: String,
        kind: ErrorKind,
        details: Option<Value>,
    ) -> Response {
        let body = ErrorBody {
            error: message,
            kind,
            details,
            correlation_id: context::correlation_id(),
            timestamp: now_timestamp(),
        };
        (status, Json(body)).into_response()
    }
}
