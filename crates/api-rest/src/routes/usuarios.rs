//! User registration endpoint.
//!
//! `POST /api/usuarios` is public by method and gated by the `register`
//! rate-limit policy in the middleware stack.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::post,
    Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::error::success_response;
use crate::state::{AppState, NuevoUsuario};
use mercadito_common::LogContext;

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUsuario {
    #[validate(email(message = "Email inválido"))]
    pub email: String,

    #[validate(length(min = 1, max = 120, message = "El nombre es requerido"))]
    pub nombre: String,

    pub apellidos: Option<String>,

    pub telefono: Option<String>,

    pub rol: Option<String>,

    #[validate(length(min = 8, message = "La contraseña debe tener al menos 8 caracteres"))]
    pub password: String,
}

/// Registration confirmation payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsuarioCreado {
    pub message: String,
    pub user_id: String,
}

/// User registration routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/usuarios", post(crear))
}

/// Register a new account
async fn crear(
    State(state): State<AppState>,
    payload: Result<Json<CreateUsuario>, JsonRejection>,
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

    let nuevo = NuevoUsuario {
        email: payload.email,
        nombre: payload.nombre,
        apellidos: payload.apellidos,
        telefono: payload.telefono,
        rol: payload.rol,
    };

    match state.usuarios.insert(nuevo) {
        Ok(usuario) => {
            let ctx = LogContext::new()
                .set("userId", usuario.id.clone())
                .set("email", usuario.email.clone())
                .set("type", "registration");
            state.logger.info("User registered", Some(ctx)).await;

            success_response(
                UsuarioCreado {
                    message: "Usuario creado exitosamente".to_string(),
                    user_id: usuario.id,
                },
                StatusCode::CREATED,
            )
        }
        Err(error) => state.responder.handle(error).await,
    }
}
