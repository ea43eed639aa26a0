//! Auth Service
//!
//! Verifies login credentials and issues/validates bearer tokens.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;

use super::CredentialsStore;

/// Upper bound on token lifetime (30 days)
pub const MAX_TOKEN_TTL_MINUTES: i64 = 30 * 24 * 60;

/// JWT claims carried by every bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown login, wrong password or missing form field
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Credential store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialsStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl AuthService {
    /// `ttl_minutes` is clamped to +/- `MAX_TOKEN_TTL_MINUTES`
    pub fn new(credentials: Arc<dyn CredentialsStore>, signing_key: &str, ttl_minutes: i64) -> Self {
        Self {
            credentials,
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
            ttl: Duration::minutes(
                ttl_minutes.clamp(-MAX_TOKEN_TTL_MINUTES, MAX_TOKEN_TTL_MINUTES),
            ),
        }
    }

    /// Check credentials and issue a token for the matching user
    pub async fn login(&self, login: &str, password: &str) -> Result<String, AuthError> {
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let credential = self
            .credentials
            .find_by_login(login)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&credential.password_hash)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)?;

        tracing::info!(user_id = credential.user_id, "User logged in");
        self.issue_token(credential.user_id)
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthError::InvalidToken
            })
    }
}
