//! Transfer Error Types
//!
//! The error taxonomy shared by the transfer protocol and the ledger storage.
//! Errors returned by a balance mutation travel through the repository unchanged.

use rust_decimal::Decimal;
use thiserror::Error;

use super::amount::{AmountError, Currency};
use super::{BalanceId, UserId};
use crate::ledger::StorageError;

/// Errors produced while validating, locking, settling or releasing a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed request, detected before any storage access
    #[error("Invalid transfer request: {0}")]
    Validation(String),

    /// A referenced balance does not exist
    #[error("Balance not found: expected {expected} balance(s), found {found}")]
    NotFound { expected: usize, found: usize },

    /// A balance is already owned by another in-flight transfer
    #[error("Sender or receiver balance is locked by another transfer")]
    Conflict,

    /// Caller does not own the sender balance
    #[error("User {caller} does not own sender balance {balance_id}")]
    Unauthorized { caller: UserId, balance_id: BalanceId },

    /// Sender balance does not strictly exceed the transfer amount
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    /// Balance is denominated in a different currency than the transfer
    #[error("Currency mismatch on balance {balance_id}: expected {expected}, found {found}")]
    CurrencyMismatch {
        balance_id: BalanceId,
        expected: Currency,
        found: Currency,
    },

    /// Lock flag is not where the protocol left it
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Unit-of-work failure (read, write, commit or rollback)
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentState(msg.into())
    }

    /// Stable machine-readable code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::NotFound { .. } => "balance_not_found",
            Self::Conflict => "balance_locked",
            Self::Unauthorized { .. } => "unauthorized_transfer",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::InconsistentState(_) => "inconsistent_state",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::Unauthorized { .. }
                | Self::InsufficientFunds { .. }
                | Self::CurrencyMismatch { .. }
        )
    }

    /// Check if this is a conflict error (the caller may retry later)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl From<AmountError> for TransferError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}
