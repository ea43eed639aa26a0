//! Credential storage

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::UserId;

use super::service::{hash_password, AuthError};

/// A login name, its Argon2 hash and the user it authenticates
#[derive(Debug, Clone)]
pub struct Credential {
    pub login: String,
    pub password_hash: String,
    pub user_id: UserId,
}

#[async_trait]
pub trait CredentialsStore: Send + Sync {
    async fn find_by_login(&self, login: &str) -> Result<Option<Credential>, AuthError>;
}

#[derive(Debug, Clone)]
pub struct PgCredentialsStore {
    pool: PgPool,
}

impl PgCredentialsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialsStore for PgCredentialsStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<Credential>, AuthError> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT login, password_hash, user_id
            FROM credentials
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(login, password_hash, user_id)| Credential {
            login,
            password_hash,
            user_id,
        }))
    }
}

/// Credentials held in memory, hashed on insert
#[derive(Debug, Default)]
pub struct InMemoryCredentialsStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, login: &str, password: &str, user_id: UserId) -> Result<(), AuthError> {
        let credential = Credential {
            login: login.to_string(),
            password_hash: hash_password(password)?,
            user_id,
        };
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential.login.clone(), credential);
        Ok(())
    }
}

#[async_trait]
impl CredentialsStore for InMemoryCredentialsStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(login)
            .cloned())
    }
}
