//! Session authentication provider.
//!
//! Protected routes delegate to the [`SessionAuth`] implementation held in
//! application state. The default provider validates `Authorization: Bearer`
//! HS256 tokens; deployments swap in a provider backed by an account store
//! to also serve credential sign-in.

use async_trait::async_trait;
use http::{header, HeaderMap};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credentials on the request
    #[error("Authentication required")]
    MissingCredentials,

    /// Credentials present but rejected
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Email/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Claims carried in a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,

    /// Account email
    pub email: String,

    /// Expiration time (UTC timestamp)
    pub exp: usize,
}

/// An authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    /// User id the session belongs to
    pub user_id: String,

    /// Account email
    pub email: String,
}

/// Pluggable session-auth provider
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// Authenticate an inbound request from its headers
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, AuthError>;

    /// Verify an email/password pair during sign-in
    async fn verify_credentials(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;
}

/// Bearer-token provider for HS256 session tokens.
///
/// Carries no account store, so [`SessionAuth::verify_credentials`] always
/// rejects; sign-in needs a store-backed provider.
pub struct JwtSessionAuth {
    decoding_key: DecodingKey,
}

impl JwtSessionAuth {
    /// Create a provider validating tokens signed with `secret`
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl SessionAuth for JwtSessionAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AuthError::InvalidToken("invalid authorization header format".to_string())
        })?;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(Session {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }

    async fn verify_credentials(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Session, AuthError> {
        Err(AuthError::InvalidCredentials)
    }
}
