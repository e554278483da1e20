//! HTTP route handlers.
//!
//! This module organizes all API endpoints by domain.

pub mod auth;
pub mod health;
pub mod productos;
pub mod usuarios;

use crate::state::AppState;
use axum::Router;

/// Create all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(productos::routes())
        .merge(usuarios::routes())
}
