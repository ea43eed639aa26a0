//! Ledger Storage Errors
//!
//! Unit-of-work failures raised by the ledger repositories.

use crate::domain::TransferError;

/// Errors that can occur while running a ledger unit of work
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Read or write failed inside the unit of work
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The unit of work could not be committed
    #[error("Commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    /// Rolling back after `cause` failed as well; both are kept
    #[error("Rollback failed ({rollback}) after: {cause}")]
    RollbackFailed {
        cause: Box<TransferError>,
        #[source]
        rollback: sqlx::Error,
    },

    /// A stored row violates a domain constraint
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    /// True if the unit of work may have left state behind that needs an operator
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::RollbackFailed { .. })
    }

    /// The error that triggered a failed rollback, if any
    pub fn rollback_cause(&self) -> Option<&TransferError> {
        match self {
            StorageError::RollbackFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
