//! Ledger Repository contract
//!
//! Two atomic primitives drive the transfer protocol:
//! - `update_balances`: read-modify-write a fixed set of balances in one unit of work
//! - `make_transaction`: settle a sender/receiver pair and record the transaction
//!   in one unit of work
//!
//! The caller decides the mutation through a strategy object; the repository
//! owns the unit of work and guarantees all-or-nothing execution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Balance, BalanceId, BalancePair, Transaction, TransferError, TransferRequest, UserId,
};

/// Mutation applied to balances fetched by `update_balances`.
pub trait BalanceMutation: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Receives the balances in requested-id order. Returning an error rolls
    /// the unit of work back and the error propagates unchanged.
    fn apply(&self, balances: Vec<Balance>) -> Result<Vec<Balance>, TransferError>;
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub pair: BalancePair,
    pub occurred_at: DateTime<Utc>,
}

/// Mutation applied to the sender/receiver pair by `make_transaction`.
pub trait Settlement: Send + Sync {
    fn settle(&self, pair: BalancePair, request: &TransferRequest) -> Result<Settled, TransferError>;
}

/// Storage-facing ledger operations.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Fetch `ids`, run `mutation`, persist the result. Fails with `NotFound`
    /// if any id is absent.
    async fn update_balances(
        &self,
        ids: &[BalanceId],
        mutation: &dyn BalanceMutation,
    ) -> Result<Vec<Balance>, TransferError>;

    /// Fetch the request's pair, run `settlement`, then insert the transaction,
    /// link it to both balances and persist them.
    async fn make_transaction(
        &self,
        request: &TransferRequest,
        settlement: &dyn Settlement,
    ) -> Result<Transaction, TransferError>;

    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>, TransferError>;

    /// Transactions touching any balance owned by `user_id`, newest first.
    async fn transactions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, TransferError>;

    /// Every balance currently flagged as locked
    async fn locked_balances(&self) -> Result<Vec<Balance>, TransferError>;
}

/// Collapse duplicate ids, keeping first-seen order.
pub(crate) fn distinct_ids(ids: &[BalanceId]) -> Vec<BalanceId> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

/// Reorder fetched rows to follow `ids`. Fails with `NotFound` if any is missing.
pub(crate) fn order_by_ids(
    ids: &[BalanceId],
    mut fetched: Vec<Balance>,
) -> Result<Vec<Balance>, TransferError> {
    if fetched.len() < ids.len() {
        return Err(TransferError::NotFound {
            expected: ids.len(),
            found: fetched.len(),
        });
    }

    let mut ordered = Vec::with_capacity(ids.len());
    for id in ids {
        let idx = fetched
            .iter()
            .position(|b| b.id == *id)
            .ok_or(TransferError::NotFound {
                expected: ids.len(),
                found: ordered.len(),
            })?;
        ordered.push(fetched.swap_remove(idx));
    }
    Ok(ordered)
}

/// A mutation may only hand back balances it was given, each at most once.
pub(crate) fn check_mutated(
    ids: &[BalanceId],
    mutated: &[Balance],
) -> Result<(), TransferError> {
    let mut seen = Vec::with_capacity(mutated.len());
    for balance in mutated {
        if !ids.contains(&balance.id) || seen.contains(&balance.id) {
            return Err(TransferError::inconsistent(format!(
                "mutation returned unexpected balance {}",
                balance.id
            )));
        }
        seen.push(balance.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    fn balance(id: BalanceId) -> Balance {
        Balance::new(id, 1, Currency::Sgd, dec!(10))
    }

    #[test]
    fn test_distinct_ids() {
        assert_eq!(distinct_ids(&[2, 1, 2, 3, 1]), vec![2, 1, 3]);
    }

    #[test]
    fn test_order_by_ids_follows_request() {
        let ordered = order_by_ids(&[3, 1], vec![balance(1), balance(3)]).unwrap();
        assert_eq!(ordered[0].id, 3);
        assert_eq!(ordered[1].id, 1);
    }

    #[test]
    fn test_order_by_ids_missing() {
        let err = order_by_ids(&[1, 999], vec![balance(1)]).unwrap_err();
        assert!(matches!(
            err,
            TransferError::NotFound {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_check_mutated_rejects_foreign_balance() {
        assert!(check_mutated(&[1, 2], &[balance(1), balance(2)]).is_ok());
        assert!(matches!(
            check_mutated(&[1, 2], &[balance(3)]),
            Err(TransferError::InconsistentState(_))
        ));
        assert!(matches!(
            check_mutated(&[1, 2], &[balance(1), balance(1)]),
            Err(TransferError::InconsistentState(_))
        ));
    }
}
