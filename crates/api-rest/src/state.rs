//! Application state and dependency injection.
//!
//! The state carries the logging, rate-limiting and error-handling services
//! every middleware layer and handler needs, plus in-memory stores backing
//! the catalog and registration routes in development and tests.

use crate::auth::{JwtSessionAuth, SessionAuth};
use crate::config::ApiConfig;
use crate::error::{ErrorResponder, RequestError};
use chrono::{DateTime, Utc};
use mercadito_common::{Logger, RuntimeMode};
use mercadito_infrastructure::RateLimiter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// API configuration
    pub config: Arc<ApiConfig>,

    /// Runtime mode the service was started in
    pub mode: RuntimeMode,

    /// Structured logger
    pub logger: Arc<Logger>,

    /// Rate limiter with its selected backend
    pub limiter: Arc<RateLimiter>,

    /// Error classifier and responder
    pub responder: Arc<ErrorResponder>,

    /// Session-auth provider (type-erased)
    pub session_auth: Arc<dyn SessionAuth>,

    /// Product catalog
    pub catalog: Arc<ProductoCatalog>,

    /// User directory
    pub usuarios: Arc<UsuarioDirectory>,
}

impl AppState {
    /// Create state with the default bearer-token session provider and
    /// in-memory stores. Suitable for development and testing.
    pub fn new(
        config: ApiConfig,
        mode: RuntimeMode,
        logger: Arc<Logger>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let responder = Arc::new(ErrorResponder::new(logger.clone(), mode));
        let session_auth: Arc<dyn SessionAuth> =
            Arc::new(JwtSessionAuth::new(&config.session_jwt_secret));

        Self {
            config: Arc::new(config),
            mode,
            logger,
            limiter,
            responder,
            session_auth,
            catalog: Arc::new(ProductoCatalog::with_demo_data()),
            usuarios: Arc::new(UsuarioDirectory::new()),
        }
    }

    /// Replace the session-auth provider
    pub fn with_session_auth(mut self, session_auth: Arc<dyn SessionAuth>) -> Self {
        self.session_auth = session_auth;
        self
    }
}

/// Product record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Producto {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub nombre: String,
    /// Unit price
    pub precio: f64,
    /// Owning category
    pub categoria_id: i64,
    /// Owning business
    pub negocio_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// In-memory product catalog for development
pub struct ProductoCatalog {
    productos: RwLock<Vec<Producto>>,
}

impl ProductoCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            productos: RwLock::new(Vec::new()),
        }
    }

    /// Catalog pre-seeded with demo products
    pub fn with_demo_data() -> Self {
        let catalog = Self::new();
        catalog.insert("Producto Demo 1", 100.0, 1, 1);
        catalog.insert("Producto Demo 2", 200.0, 2, 1);
        catalog.insert("Producto Demo 3", 150.0, 1, 2);
        catalog
    }

    /// All products, in insertion order
    pub fn list(&self) -> Vec<Producto> {
        self.productos.read().clone()
    }

    /// Add a product and return the stored record
    pub fn insert(
        &self,
        nombre: &str,
        precio: f64,
        categoria_id: i64,
        negocio_id: i64,
    ) -> Producto {
        let now = Utc::now();
        let producto = Producto {
            id: Uuid::new_v4().to_string(),
            nombre: nombre.to_string(),
            precio,
            categoria_id,
            negocio_id,
            created_at: now,
            updated_at: now,
        };
        self.productos.write().push(producto.clone());
        producto
    }
}

impl Default for ProductoCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// User record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usuario {
    /// Unique identifier
    pub id: String,
    /// Account email, unique
    pub email: String,
    /// First name
    pub nombre: String,
    /// Last names
    pub apellidos: Option<String>,
    /// Contact phone
    pub telefono: Option<String>,
    /// Account role
    pub rol: String,
    /// Account lifecycle state
    pub estado: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// New-account data accepted by the directory
#[derive(Debug, Clone)]
pub struct NuevoUsuario {
    /// Account email, unique
    pub email: String,
    /// First name
    pub nombre: String,
    /// Last names
    pub apellidos: Option<String>,
    /// Contact phone
    pub telefono: Option<String>,
    /// Account role, defaults to `usuario`
    pub rol: Option<String>,
}

/// In-memory user directory for development, keyed by normalized email
pub struct UsuarioDirectory {
    usuarios: RwLock<HashMap<String, Usuario>>,
}

impl UsuarioDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            usuarios: RwLock::new(HashMap::new()),
        }
    }

    /// Register an account. Duplicate emails surface the store's
    /// duplicate-key error so they classify like any datastore failure.
    pub fn insert(&self, data: NuevoUsuario) -> Result<Usuario, RequestError> {
        let key = data.email.to_lowercase();
        let mut usuarios = self.usuarios.write();

        if usuarios.contains_key(&key) {
            return Err(RequestError::new(format!(
                "Duplicate entry '{}' for key 'usuarios.email'",
                data.email
            ))
            .with_name("DatabaseError")
            .with_code("ER_DUP_ENTRY"));
        }

        let usuario = Usuario {
            id: Uuid::new_v4().to_string(),
            email: data.email,
            nombre: data.nombre,
            apellidos: data.apellidos,
            telefono: data.telefono,
            rol: data.rol.unwrap_or_else(|| "usuario".to_string()),
            estado: "pendiente_verificacion".to_string(),
            created_at: Utc::now(),
        };
        usuarios.insert(key, usuario.clone());
        Ok(usuario)
    }

    /// Look up an account by email, case-insensitive
    pub fn find_by_email(&self, email: &str) -> Option<Usuario> {
        self.usuarios.read().get(&email.to_lowercase()).cloned()
    }
}

impl Default for UsuarioDirectory {
    fn default() -> Self {
        Self::new()
    }
}
