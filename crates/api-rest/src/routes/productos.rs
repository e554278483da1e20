//! Product catalog endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::get,
    Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::error::success_response;
use crate::state::{AppState, Producto};

/// Product listing payload
#[derive(Debug, Serialize)]
pub struct ProductoList {
    pub productos: Vec<Producto>,
    pub total: usize,
}

/// Create-product request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProducto {
    #[validate(length(min = 1, max = 200, message = "El nombre es requerido"))]
    pub nombre: String,

    #[validate(range(min = 0.0, message = "El precio no puede ser negativo"))]
    pub precio: f64,

    pub categoria_id: i64,

    pub negocio_id: i64,
}

/// Product catalog routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/productos", get(listar).post(crear))
}

/// Public product listing
async fn listar(State(state): State<AppState>) -> Response {
    let productos = state.catalog.list();
    let total = productos.len();
    success_response(ProductoList { productos, total }, StatusCode::OK)
}

/// Create a product. Protected; the session gate has already run.
async fn crear(
    State(state): State<AppState>,
    payload: Result<Json<CreateProducto>, JsonRejection>,
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

    let producto = state.catalog.insert(
        &payload.nombre,
        payload.precio,
        payload.categoria_id,
        payload.negocio_id,
    );
    success_response(producto, StatusCode::CREATED)
}
