//! Command definitions
//!
//! Commands carry untyped input from the HTTP surface until they are parsed
//! into domain requests.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{Amount, BalanceId, Currency, TransferError, TransferRequest};

/// Command to move money between two balances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCommand {
    pub sender_balance_id: BalanceId,
    pub receiver_balance_id: BalanceId,
    /// Amount to transfer (as string for precise decimal)
    pub amount: String,
    /// ISO code, SGD when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl TransferCommand {
    pub fn new(sender_balance_id: BalanceId, receiver_balance_id: BalanceId, amount: String) -> Self {
        Self {
            sender_balance_id,
            receiver_balance_id,
            amount,
            currency: None,
        }
    }

    /// Parse into a validated request. Malformed input is a `Validation` error.
    pub fn into_request(self) -> Result<TransferRequest, TransferError> {
        let currency = match self.currency.as_deref() {
            Some(code) => Currency::from_str(code)?,
            None => Currency::default(),
        };
        let amount = Amount::parse(&self.amount, currency)?;

        TransferRequest::new(
            self.sender_balance_id,
            self.receiver_balance_id,
            amount.value(),
            currency,
        )
    }
}
