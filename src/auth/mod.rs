//! Auth module
//!
//! Identity collaborator: credential lookup, Argon2 password verification,
//! and HS256 JWT issuance/verification. The rest of the crate only consumes
//! the resolved caller user id.

mod credentials;
mod service;

pub use credentials::{Credential, CredentialsStore, InMemoryCredentialsStore, PgCredentialsStore};
pub use service::{hash_password, AuthError, AuthService, Claims, MAX_TOKEN_TTL_MINUTES};
