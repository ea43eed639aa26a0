//! Balance Query Service
//!
//! Lists a caller's balances and the transactions that touched them. No
//! locking: results are a snapshot as of the read.

use std::sync::Arc;

use crate::domain::{Balance, Transaction, TransferError, UserId};
use crate::ledger::LedgerRepository;

/// Read side of the ledger
#[derive(Clone)]
pub struct BalanceQueryService {
    ledger: Arc<dyn LedgerRepository>,
}

impl BalanceQueryService {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    /// Balances owned by `caller`, ordered by id
    pub async fn get_by_user_id(&self, caller: UserId) -> Result<Vec<Balance>, TransferError> {
        let balances = self.ledger.balances_for_user(caller).await?;
        tracing::debug!(caller, count = balances.len(), "Listed balances");
        Ok(balances)
    }

    /// Transactions touching any balance owned by `caller`, newest first
    pub async fn retrieve(&self, caller: UserId) -> Result<Vec<Transaction>, TransferError> {
        let transactions = self.ledger.transactions_for_user(caller).await?;
        tracing::debug!(caller, count = transactions.len(), "Listed transactions");
        Ok(transactions)
    }
}
