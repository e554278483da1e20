//! Request/response logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;

use crate::state::AppState;

/// Logs one request line on entry and one response line with status and
/// elapsed time on exit, on every path through the stack.
pub async fn logging_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();
    let method = req.method().to_string();
    let url = req.uri().to_string();

    state.logger.log_request(&method, &url, None).await;

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    state
        .logger
        .log_response(&method, &url, response.status().as_u16(), duration_ms, None)
        .await;

    response
}
