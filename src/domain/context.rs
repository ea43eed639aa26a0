//! Operation Context
//!
//! Metadata about the current request: who is calling, and the correlation
//! id used to tie log lines of one transfer together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TransferError;
use super::UserId;

/// Context for an operation, built by the auth middleware.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Authenticated user taken from the bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_user_id: Option<UserId>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller(mut self, user_id: UserId) -> Self {
        self.caller_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// The authenticated caller, or a validation error for anonymous contexts.
    pub fn require_caller(&self) -> Result<UserId, TransferError> {
        match self.caller_user_id {
            Some(id) if id > 0 => Ok(id),
            _ => Err(TransferError::validation("caller user id is required")),
        }
    }
}
