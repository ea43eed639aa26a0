//! Balance mutations used by the transfer protocol
//!
//! Each strategy runs inside a ledger unit of work on in-memory copies of
//! the fetched balances. Returning an error rolls the unit of work back.

use chrono::Utc;

use crate::domain::{Balance, BalancePair, TransferError, TransferRequest, UserId};
use crate::ledger::{BalanceMutation, Settled, Settlement};

/// Acquire: lock every balance, or fail with `Conflict` if any is taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockIfFree;

impl BalanceMutation for LockIfFree {
    fn name(&self) -> &'static str {
        "lock_if_free"
    }

    fn apply(&self, mut balances: Vec<Balance>) -> Result<Vec<Balance>, TransferError> {
        if balances.iter().any(Balance::is_locked) {
            return Err(TransferError::Conflict);
        }
        balances.iter_mut().for_each(Balance::lock);
        Ok(balances)
    }
}

/// Release: unlock every balance. A balance that is already unlocked means
/// something outside the protocol touched the flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlockIfLocked;

impl BalanceMutation for UnlockIfLocked {
    fn name(&self) -> &'static str {
        "unlock_if_locked"
    }

    fn apply(&self, mut balances: Vec<Balance>) -> Result<Vec<Balance>, TransferError> {
        if let Some(free) = balances.iter().find(|b| !b.is_locked()) {
            return Err(TransferError::inconsistent(format!(
                "balance {} is not locked at release",
                free.id
            )));
        }
        balances.iter_mut().for_each(Balance::unlock);
        Ok(balances)
    }
}

/// Apply: authorize, check, move the amount and unlock both balances.
#[derive(Debug, Clone, Copy)]
pub struct SettleTransfer {
    caller: UserId,
}

impl SettleTransfer {
    pub fn new(caller: UserId) -> Self {
        Self { caller }
    }
}

impl Settlement for SettleTransfer {
    fn settle(
        &self,
        mut pair: BalancePair,
        request: &TransferRequest,
    ) -> Result<Settled, TransferError> {
        if !pair.sender.is_owned_by(self.caller) {
            return Err(TransferError::Unauthorized {
                caller: self.caller,
                balance_id: pair.sender.id,
            });
        }

        let currency = request.currency();
        for balance in [&pair.sender, &pair.receiver] {
            if balance.currency != currency {
                return Err(TransferError::CurrencyMismatch {
                    balance_id: balance.id,
                    expected: currency,
                    found: balance.currency,
                });
            }
        }

        if !pair.both_locked() {
            return Err(TransferError::inconsistent(
                "settling a pair that is not locked",
            ));
        }

        let amount = request.amount();
        if !pair.sender.covers(amount) {
            return Err(TransferError::InsufficientFunds {
                available: pair.sender.amount,
                requested: amount.value(),
            });
        }

        pair.sender.debit(amount);
        pair.receiver.credit(amount);
        pair.sender.unlock();
        pair.receiver.unlock();

        Ok(Settled {
            pair,
            occurred_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    fn locked(id: i64, owner: UserId, amount: rust_decimal::Decimal) -> Balance {
        let mut balance = Balance::new(id, owner, Currency::Sgd, amount);
        balance.lock();
        balance
    }

    fn request(amount: rust_decimal::Decimal) -> TransferRequest {
        TransferRequest::new(1, 2, amount, Currency::Sgd).unwrap()
    }

    #[test]
    fn test_lock_if_free() {
        let balances = vec![
            Balance::new(1, 10, Currency::Sgd, dec!(5)),
            Balance::new(2, 20, Currency::Sgd, dec!(5)),
        ];
        let locked = LockIfFree.apply(balances).unwrap();
        assert!(locked.iter().all(Balance::is_locked));
    }

    #[test]
    fn test_mutation_names() {
        assert_eq!(LockIfFree.name(), "lock_if_free");
        assert_eq!(UnlockIfLocked.name(), "unlock_if_locked");
    }

    #[test]
    fn test_lock_if_free_conflict() {
        let balances = vec![
            Balance::new(1, 10, Currency::Sgd, dec!(5)),
            locked(2, 20, dec!(5)),
        ];
        assert!(matches!(
            LockIfFree.apply(balances),
            Err(TransferError::Conflict)
        ));
    }

    #[test]
    fn test_unlock_if_locked() {
        let balances = vec![locked(1, 10, dec!(5)), locked(2, 20, dec!(5))];
        let unlocked = UnlockIfLocked.apply(balances).unwrap();
        assert!(unlocked.iter().all(|b| !b.is_locked()));
    }

    #[test]
    fn test_unlock_if_locked_inconsistent() {
        let balances = vec![locked(1, 10, dec!(5)), Balance::new(2, 20, Currency::Sgd, dec!(5))];
        assert!(matches!(
            UnlockIfLocked.apply(balances),
            Err(TransferError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_settle_moves_amount_and_unlocks() {
        let pair = BalancePair::new(locked(1, 10, dec!(1000.00)), locked(2, 20, dec!(25.25)));
        let settled = SettleTransfer::new(10)
            .settle(pair, &request(dec!(11.49)))
            .unwrap();

        assert_eq!(settled.pair.sender.amount, dec!(988.51));
        assert_eq!(settled.pair.receiver.amount, dec!(36.74));
        assert!(!settled.pair.sender.is_locked());
        assert!(!settled.pair.receiver.is_locked());
    }

    #[test]
    fn test_settle_rejects_foreign_sender() {
        let pair = BalancePair::new(locked(1, 10, dec!(100)), locked(2, 20, dec!(0)));
        let err = SettleTransfer::new(20)
            .settle(pair, &request(dec!(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Unauthorized {
                caller: 20,
                balance_id: 1
            }
        ));
    }

    #[test]
    fn test_settle_requires_strictly_more_than_amount() {
        let pair = BalancePair::new(locked(1, 10, dec!(50)), locked(2, 20, dec!(0)));
        let err = SettleTransfer::new(10)
            .settle(pair, &request(dec!(50)))
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_settle_rejects_currency_mismatch() {
        let mut receiver = locked(2, 20, dec!(0));
        receiver.currency = Currency::Usd;
        let pair = BalancePair::new(locked(1, 10, dec!(100)), receiver);

        let err = SettleTransfer::new(10)
            .settle(pair, &request(dec!(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::CurrencyMismatch { balance_id: 2, .. }
        ));
    }

    #[test]
    fn test_settle_requires_locked_pair() {
        let pair = BalancePair::new(
            Balance::new(1, 10, Currency::Sgd, dec!(100)),
            locked(2, 20, dec!(0)),
        );
        let err = SettleTransfer::new(10)
            .settle(pair, &request(dec!(1)))
            .unwrap_err();
        assert!(matches!(err, TransferError::InconsistentState(_)));
    }
}
