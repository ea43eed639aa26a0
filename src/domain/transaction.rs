//! Transaction record and transfer request
//!
//! A `Transaction` is the immutable record of a completed transfer. A
//! `TransferRequest` is the validated input to the transfer protocol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::{Amount, Currency};
use super::error::TransferError;
use super::{BalanceId, TransactionId};

/// A completed, successful transfer. Failed attempts never produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_balance_id: BalanceId,
    pub receiver_balance_id: BalanceId,
    pub amount: Decimal,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

/// Validated request to move `amount` from one balance to another.
///
/// Construction enforces, without touching storage:
/// - both balance ids are present (> 0)
/// - sender and receiver differ
/// - amount rounded to the currency's minor unit is > 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    sender_balance_id: BalanceId,
    receiver_balance_id: BalanceId,
    amount: Amount,
}

impl TransferRequest {
    pub fn new(
        sender_balance_id: BalanceId,
        receiver_balance_id: BalanceId,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Self, TransferError> {
        if sender_balance_id <= 0 {
            return Err(TransferError::validation("sender balance id is required"));
        }
        if receiver_balance_id <= 0 {
            return Err(TransferError::validation("receiver balance id is required"));
        }
        if sender_balance_id == receiver_balance_id {
            return Err(TransferError::validation(
                "sender and receiver balance must differ",
            ));
        }

        let amount = Amount::new(amount, currency)?;

        Ok(Self {
            sender_balance_id,
            receiver_balance_id,
            amount,
        })
    }

    pub fn sender_balance_id(&self) -> BalanceId {
        self.sender_balance_id
    }

    pub fn receiver_balance_id(&self) -> BalanceId {
        self.receiver_balance_id
    }

    /// Both ids in sender, receiver order.
    pub fn balance_ids(&self) -> [BalanceId; 2] {
        [self.sender_balance_id, self.receiver_balance_id]
    }

    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }
}
