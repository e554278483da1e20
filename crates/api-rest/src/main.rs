//! mercadito REST API server binary.

use anyhow::Context;
use mercadito_api_rest::{create_app, ApiConfig, AppState};
use mercadito_common::{Logger, LoggerConfig, RuntimeMode};
use mercadito_infrastructure::{RateLimitConfig, RateLimiter};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = RuntimeMode::from_env();
    let config = ApiConfig::from_env().context("Failed to load configuration")?;

    let logger = Arc::new(Logger::new(LoggerConfig::from_env_with_mode(mode)));
    let limiter = Arc::new(RateLimiter::connect(&RateLimitConfig::from_env(), logger.clone()).await);

    let state = AppState::new(config.clone(), mode, logger.clone(), limiter);
    let app = create_app(state);

    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    logger
        .info(format!("mercadito API listening on {address}"), None)
        .await;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
