//! Correlation middleware.
//!
//! Outermost request layer: seeds the task-local log context from the
//! inbound `X-Correlation-ID` header (or a fresh UUID), records the endpoint
//! and method, and stamps the id on every response.

use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use mercadito_common::{context, CORRELATION_ID_HEADER};

/// Middleware that scopes a correlation context around the request and
/// echoes the correlation id back on the response
pub async fn correlation_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let mut ctx = context::seed_from_headers(req.headers());
    ctx.insert("endpoint", req.uri().path());
    ctx.insert("method", req.method().as_str());
    let correlation_id = ctx.correlation_id().map(str::to_string).unwrap_or_default();

    let mut response = context::scope(ctx, next.run(req)).await;

    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use http::StatusCode;
    use tower::ServiceExt;

    async fn echo_correlation() -> String {
        context::correlation_id().unwrap_or_default()
    }

    fn app() -> Router {
        Router::new()
            .route("/echo", get(echo_correlation))
            .layer(middleware::from_fn(correlation_middleware))
    }

    #[tokio::test]
    async fn inbound_id_is_trusted_and_echoed() {
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, "corr-123")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CORRELATION_ID_HEADER).unwrap(),
            "corr-123"
        );
    }

    #[tokio::test]
    async fn missing_header_generates_an_id() {
        let request = Request::builder().uri("/echo").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(!header.is_empty());

        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(String::from_utf8_lossy(&bytes), header);
    }
}
