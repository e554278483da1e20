//! Application assembly.
//!
//! Builds the Axum router and wires the middleware stack around it. Layers
//! run outside-in: CORS, then correlation context, then request/response
//! logging, then the sensitive-path rate-limit gate, and finally session
//! authentication for protected routes.

use crate::{
    config::ApiConfig,
    middleware::{
        auth_middleware, correlation_middleware, logging_middleware, rate_limit_middleware,
    },
    routes,
    state::AppState,
};
use axum::{middleware, Router};
use http::HeaderValue;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .merge(routes::routes())
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn(correlation_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    logging_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(state, auth_middleware)),
        )
}

/// Build CORS layer from configuration
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}
