//! Integration tests for the REST API.
//!
//! Drives the assembled router (CORS, correlation, logging, rate limiting,
//! session auth) with in-memory backends and asserts on response envelopes,
//! rate-limit headers, and sanitization behavior per runtime mode.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{body::Body, response::Response, Router};
use chrono::{Duration, Utc};
use http::{header, HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::{ServiceBuilder, ServiceExt};

use mercadito_api_rest::auth::{AuthError, Session, SessionAuth, SessionClaims};
use mercadito_api_rest::middleware::{correlation_middleware, logging_middleware};
use mercadito_api_rest::{create_app, ApiConfig, AppState, RequestError};
use mercadito_common::{ConsoleSink, Logger, LoggerConfig, RuntimeMode};
use mercadito_infrastructure::{BackendKind, MemoryStore, RateLimiter};

const IP_BLOCKED_MESSAGE: &str = "Demasiados intentos. Intenta de nuevo más tarde.";
const ACCOUNT_BLOCKED_MESSAGE: &str =
    "Demasiados intentos para este email. Intenta de nuevo más tarde.";

struct QuietConsole;

impl ConsoleSink for QuietConsole {
    fn stdout_line(&self, _line: &str) {}
    fn stderr_line(&self, _line: &str) {}
}

fn test_state(mode: RuntimeMode) -> AppState {
    let config = LoggerConfig {
        mode,
        to_file: false,
        ..LoggerConfig::default()
    };
    let logger = Arc::new(Logger::with_console_sink(config, Arc::new(QuietConsole)));
    let limiter = Arc::new(RateLimiter::with_store(
        Arc::new(MemoryStore::new()),
        BackendKind::Memory,
        logger.clone(),
    ));
    AppState::new(ApiConfig::default(), mode, logger, limiter)
}

fn test_app(mode: RuntimeMode) -> Router {
    create_app(test_state(mode))
}

/// Accepts one fixed credential pair and one fixed bearer token.
struct StaticCredentials;

#[async_trait]
impl SessionAuth for StaticCredentials {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;
        match value.strip_prefix("Bearer ") {
            Some("session-token") => Ok(Session {
                user_id: "user-1".to_string(),
                email: "ana@example.com".to_string(),
            }),
            _ => Err(AuthError::InvalidToken("unknown token".to_string())),
        }
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        if email == "ana@example.com" && password == "hunter2-secret" {
            Ok(Session {
                user_id: "user-1".to_string(),
                email: email.to_string(),
            })
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, ip: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_reports_backend() {
    let app = test_app(RuntimeMode::Development);

    let response = app.oneshot(get_request("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Non-sensitive routes never carry quota headers.
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
    let correlation = header_str(&response, "x-correlation-id").to_string();

    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["rate_limit_backend"], "memory");
    assert_eq!(body["correlationId"], correlation.as_str());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn inbound_correlation_id_is_preserved() {
    let app = test_app(RuntimeMode::Development);

    let request = Request::builder()
        .uri("/api/health")
        .header("x-correlation-id", "corr-test-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(header_str(&response, "x-correlation-id"), "corr-test-123");
    let body = body_json(response).await;
    assert_eq!(body["correlationId"], "corr-test-123");
}

#[tokio::test]
async fn missing_correlation_id_is_generated() {
    let app = test_app(RuntimeMode::Development);

    let response = app.oneshot(get_request("/api/health")).await.unwrap();

    let correlation = header_str(&response, "x-correlation-id");
    assert!(uuid::Uuid::parse_str(correlation).is_ok());
}

#[tokio::test]
async fn sixth_signin_attempt_from_one_ip_is_blocked() {
    let app = test_app(RuntimeMode::Development);
    let credentials = json!({ "email": "ana@example.com", "password": "wrong-password" });

    for attempt in 1..=5 {
        let response = app
            .clone()
            .oneshot(post_json("/api/auth/signin", "203.0.113.9", &credentials))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "attempt {attempt} should reach the handler"
        );
        // The handler's per-account decision is the more specific one.
        assert_eq!(header_str(&response, "x-ratelimit-limit"), "10");
    }

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/signin", "203.0.113.9", &credentials))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "x-ratelimit-limit"), "5");
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), "0");
    let retry_after: i64 = header_str(&response, "retry-after").parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 600);

    let body = body_json(response).await;
    assert_eq!(body["error"], IP_BLOCKED_MESSAGE);
}

#[tokio::test]
async fn per_account_window_spans_ips_and_ignores_case() {
    let app = test_app(RuntimeMode::Development);
    let credentials = json!({ "email": "Ana@Example.com", "password": "wrong-password" });

    for attempt in 0..10 {
        let ip = format!("198.51.100.{attempt}");
        let response = app
            .clone()
            .oneshot(post_json("/api/auth/signin", &ip, &credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/signin", "198.51.100.200", &credentials))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "x-ratelimit-limit"), "10");
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), "0");
    let body = body_json(response).await;
    assert_eq!(body["error"], ACCOUNT_BLOCKED_MESSAGE);
}

#[tokio::test]
async fn signin_returns_session_with_quota_headers() {
    let state = test_state(RuntimeMode::Development)
        .with_session_auth(Arc::new(StaticCredentials));
    let app = create_app(state);

    let credentials = json!({ "email": "Ana@example.com", "password": "hunter2-secret" });
    let response = app
        .oneshot(post_json("/api/auth/signin", "203.0.113.1", &credentials))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-limit"), "10");
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), "9");

    let body = body_json(response).await;
    assert_eq!(body["data"]["userId"], "user-1");
    assert_eq!(body["data"]["email"], "ana@example.com");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn protected_route_requires_session() {
    let app = test_app(RuntimeMode::Development);

    let producto =
        json!({ "nombre": "Mate imperial", "precio": 1200.0, "categoriaId": 1, "negocioId": 1 });
    let response = app
        .oneshot(post_json("/api/productos", "203.0.113.2", &producto))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["type"], "AUTHENTICATION");
    assert_eq!(body["error"], "Autenticación requerida");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn session_token_unlocks_protected_route() {
    let app = test_app(RuntimeMode::Development);

    let claims = SessionClaims {
        sub: "user-7".to_string(),
        email: "ana@example.com".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    let secret = ApiConfig::default().session_jwt_secret;
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();

    let producto =
        json!({ "nombre": "Mate imperial", "precio": 1200.0, "categoriaId": 1, "negocioId": 1 });
    let request = Request::builder()
        .method("POST")
        .uri("/api/productos")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(producto.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["nombre"], "Mate imperial");
    assert!(body["data"]["id"].is_string());
}

#[tokio::test]
async fn product_listing_is_public_by_method() {
    let app = test_app(RuntimeMode::Development);

    let response = app.oneshot(get_request("/api/productos")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    assert!(body["data"]["productos"].is_array());
}

#[tokio::test]
async fn duplicate_registration_is_sanitized_in_production() {
    let app = test_app(RuntimeMode::Production);
    let payload = json!({
        "email": "dup@example.com",
        "nombre": "Ana",
        "password": "super-secret-1"
    });

    let first = app
        .clone()
        .oneshot(post_json("/api/usuarios", "203.0.113.3", &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .clone()
        .oneshot(post_json("/api/usuarios", "203.0.113.3", &payload))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(second).await;
    assert_eq!(body["type"], "DATABASE");
    assert_eq!(
        body["error"],
        "Error en la base de datos. Por favor, inténtelo de nuevo más tarde."
    );
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn duplicate_registration_is_detailed_in_development() {
    let app = test_app(RuntimeMode::Development);
    let payload = json!({
        "email": "dup@example.com",
        "nombre": "Ana",
        "password": "super-secret-1"
    });

    let first = app
        .clone()
        .oneshot(post_json("/api/usuarios", "203.0.113.13", &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let body = body_json(first).await;
    assert_eq!(body["data"]["message"], "Usuario creado exitosamente");
    assert!(body["data"]["userId"].is_string());

    let second = app
        .clone()
        .oneshot(post_json("/api/usuarios", "203.0.113.13", &payload))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(second).await;
    assert_eq!(body["type"], "DATABASE");
    assert!(body["error"].as_str().unwrap().contains("Duplicate entry"));
    assert_eq!(body["details"]["code"], "ER_DUP_ENTRY");
}

async fn external_timeout(State(state): State<AppState>) -> Response {
    state
        .responder
        .handle(RequestError::new("Connection timeout to external API"))
        .await
}

#[tokio::test]
async fn external_failure_is_sanitized_in_production_but_logged_raw() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("app.log");
    let logger = Arc::new(Logger::with_console_sink(
        LoggerConfig {
            mode: RuntimeMode::Production,
            to_file: true,
            file_path: log_path.clone(),
            ..LoggerConfig::default()
        },
        Arc::new(QuietConsole),
    ));
    let limiter = Arc::new(RateLimiter::with_store(
        Arc::new(MemoryStore::new()),
        BackendKind::Memory,
        logger.clone(),
    ));
    let state = AppState::new(
        ApiConfig::default(),
        RuntimeMode::Production,
        logger,
        limiter,
    );

    // Correlation and logging layers around a handler that fails the way an
    // upstream call does.
    let app = Router::new()
        .route("/api/test-db", get(external_timeout))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_middleware))
                .layer(from_fn_with_state(state, logging_middleware)),
        );

    let response = app.oneshot(get_request("/api/test-db")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let correlation_id = header_str(&response, "x-correlation-id").to_string();

    let body = body_json(response).await;
    assert_eq!(body["type"], "EXTERNAL_SERVICE");
    assert_eq!(
        body["error"],
        "Error en el servicio externo. Por favor, inténtelo de nuevo más tarde."
    );
    assert!(body.get("details").is_none());
    assert_eq!(body["correlationId"], correlation_id.as_str());
    assert!(!body.to_string().contains("Connection timeout"));

    let entries: Vec<Value> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // Request, error, and response lines all carry the request's id.
    assert!(!entries.is_empty());
    assert!(entries
        .iter()
        .all(|entry| entry["correlationId"] == correlation_id.as_str()));

    let error_line = entries
        .iter()
        .find(|entry| entry["context"]["type"] == "error")
        .expect("error entry in the log file");
    assert_eq!(error_line["level"], "error");
    assert_eq!(
        error_line["message"],
        "EXTERNAL_SERVICE: Error en el servicio externo. Por favor, inténtelo de nuevo más tarde."
    );
    assert_eq!(
        error_line["error"]["message"],
        "Connection timeout to external API"
    );
    assert_eq!(error_line["context"]["errorType"], "EXTERNAL_SERVICE");
    assert_eq!(error_line["context"]["statusCode"], 502);
}

#[tokio::test]
async fn register_quota_is_independent_of_signin() {
    let app = test_app(RuntimeMode::Development);
    let ip = "203.0.113.4";

    for n in 0..3 {
        let payload = json!({
            "email": format!("user{n}@example.com"),
            "nombre": "Ana",
            "password": "super-secret-1"
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/usuarios", ip, &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let payload = json!({
        "email": "user4@example.com",
        "nombre": "Ana",
        "password": "super-secret-1"
    });
    let blocked = app
        .clone()
        .oneshot(post_json("/api/usuarios", ip, &payload))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(blocked).await;
    assert_eq!(body["error"], IP_BLOCKED_MESSAGE);

    // The exhausted register window leaves the signin window untouched.
    let credentials = json!({ "email": "ana@example.com", "password": "wrong-password" });
    let signin = app
        .clone()
        .oneshot(post_json("/api/auth/signin", ip, &credentials))
        .await
        .unwrap();
    assert_eq!(signin.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oauth_callback_prefix_is_gated() {
    let app = test_app(RuntimeMode::Development);
    let ip = "203.0.113.5";

    for _ in 0..10 {
        let request = Request::builder()
            .uri("/api/auth/callback/google")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        // No handler behind the prefix, but the gate still meters it.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header_str(&response, "x-ratelimit-limit"), "10");
    }

    let request = Request::builder()
        .uri("/api/auth/callback/google")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn forgot_password_hides_account_existence() {
    let app = test_app(RuntimeMode::Development);
    let expected =
        "Si el email está registrado, recibirás instrucciones para restablecer tu contraseña";

    let unknown = app
        .clone()
        .oneshot(post_json(
            "/api/auth/password/forgot",
            "203.0.113.6",
            &json!({ "email": "ghost@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::OK);
    let unknown_body = body_json(unknown).await;
    assert_eq!(unknown_body["message"], expected);

    let registration = json!({
        "email": "real@example.com",
        "nombre": "Ana",
        "password": "super-secret-1"
    });
    let created = app
        .clone()
        .oneshot(post_json("/api/usuarios", "203.0.113.6", &registration))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let known = app
        .clone()
        .oneshot(post_json(
            "/api/auth/password/forgot",
            "203.0.113.6",
            &json!({ "email": "real@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(known.status(), StatusCode::OK);
    let known_body = body_json(known).await;
    assert_eq!(known_body["message"], expected);
}

#[tokio::test]
async fn reset_with_unknown_token_is_rejected() {
    let app = test_app(RuntimeMode::Development);

    let response = app
        .oneshot(post_json(
            "/api/auth/password/reset",
            "203.0.113.7",
            &json!({ "token": "stale-token", "password": "new-password-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["type"], "VALIDATION");
    assert_eq!(body["error"], "Token inválido o expirado");
}

#[tokio::test]
async fn malformed_json_yields_validation_error() {
    let app = test_app(RuntimeMode::Development);

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.8")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["type"], "VALIDATION");
    assert_eq!(body["error"], "Datos inválidos");
}

#[tokio::test]
async fn field_validation_errors_include_details() {
    let app = test_app(RuntimeMode::Development);

    let response = app
        .oneshot(post_json(
            "/api/auth/signin",
            "203.0.113.10",
            &json!({ "email": "not-an-email", "password": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["type"], "VALIDATION");
    assert_eq!(body["details"]["email"][0]["message"], "Email inválido");
    assert_eq!(
        body["details"]["password"][0]["message"],
        "La contraseña es requerida"
    );
}
