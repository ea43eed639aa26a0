//! In-memory Ledger Repository
//!
//! Units of work are serialized behind one async mutex and staged on copies,
//! so a failed unit of work leaves nothing behind. Also serves as the fake
//! store for protocol tests: a settlement gate to interleave attempts, and
//! fault injection for storage, commit and rollback failures.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, Notify};

use crate::domain::{
    Balance, BalanceId, BalancePair, Transaction, TransactionId, TransferError, TransferRequest,
    UserId,
};

use super::repository::{
    check_mutated, distinct_ids, order_by_ids, BalanceMutation, LedgerRepository, Settled,
    Settlement,
};
use super::StorageError;

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<BalanceId, Balance>,
    transactions: Vec<Transaction>,
    links: Vec<(BalanceId, TransactionId)>,
    next_transaction_id: TransactionId,
}

#[derive(Debug, Default)]
struct Faults {
    fail_updates: usize,
    fail_transaction: bool,
    fail_rollback: bool,
}

#[derive(Debug, Default)]
struct GateInner {
    entered: Notify,
    release: Notify,
}

/// Parks one `make_transaction` call before its unit of work opens.
#[derive(Debug, Clone)]
pub struct SettlementGate {
    inner: Arc<GateInner>,
}

impl SettlementGate {
    /// Resolves once the held call has reached the gate
    pub async fn entered(&self) {
        self.inner.entered.notified().await;
    }

    /// Let the held call continue
    pub fn release(&self) {
        self.inner.release.notify_one();
    }
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected {what} failure"))
}

/// Ledger repository holding all state in process memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    state: Mutex<LedgerState>,
    faults: StdMutex<Faults>,
    gate: StdMutex<Option<Arc<GateInner>>>,
    update_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = Balance>) -> Self {
        let state = LedgerState {
            balances: balances.into_iter().map(|b| (b.id, b)).collect(),
            ..LedgerState::default()
        };
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub async fn insert_balance(&self, balance: Balance) {
        self.state.lock().await.balances.insert(balance.id, balance);
    }

    pub async fn balance(&self, id: BalanceId) -> Option<Balance> {
        self.state.lock().await.balances.get(&id).cloned()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    /// Flip a lock flag outside any unit of work, as a writer that ignores
    /// the transfer protocol would.
    pub async fn set_locked(&self, id: BalanceId, locked: bool) {
        if let Some(balance) = self.state.lock().await.balances.get_mut(&id) {
            balance.locked = locked;
        }
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    pub fn hold_settlement(&self) -> SettlementGate {
        let inner = Arc::new(GateInner::default());
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(inner.clone());
        SettlementGate { inner }
    }

    /// The next `count` calls to `update_balances` fail at commit
    pub fn fail_next_updates(&self, count: usize) {
        self.faults().fail_updates = count;
    }

    /// The next `make_transaction` fails reading its balances
    pub fn fail_next_transaction(&self) {
        self.faults().fail_transaction = true;
    }

    /// Every rollback fails until turned off again
    pub fn fail_rollbacks(&self, fail: bool) {
        self.faults().fail_rollback = fail;
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_update_fault(&self) -> bool {
        let mut faults = self.faults();
        if faults.fail_updates > 0 {
            faults.fail_updates -= 1;
            true
        } else {
            false
        }
    }

    fn take_transaction_fault(&self) -> bool {
        std::mem::take(&mut self.faults().fail_transaction)
    }

    fn rollback(&self, cause: TransferError) -> TransferError {
        if self.faults().fail_rollback {
            return StorageError::RollbackFailed {
                cause: Box::new(cause),
                rollback: injected("rollback"),
            }
            .into();
        }
        cause
    }

    fn fetch(state: &LedgerState, ids: &[BalanceId]) -> Vec<Balance> {
        ids.iter()
            .filter_map(|id| state.balances.get(id).cloned())
            .collect()
    }

    fn stage_update(
        state: &LedgerState,
        ids: &[BalanceId],
        mutation: &dyn BalanceMutation,
    ) -> Result<Vec<Balance>, TransferError> {
        let fetched = order_by_ids(ids, Self::fetch(state, ids))?;
        let mutated = mutation.apply(fetched)?;
        check_mutated(ids, &mutated)?;
        Ok(mutated)
    }

    fn stage_settlement(
        state: &LedgerState,
        request: &TransferRequest,
        settlement: &dyn Settlement,
    ) -> Result<Settled, TransferError> {
        let fetched = Self::fetch(state, &request.balance_ids());
        let found = fetched.len();
        let pair = BalancePair::from_fetched(
            fetched,
            request.sender_balance_id(),
            request.receiver_balance_id(),
        )
        .ok_or(TransferError::NotFound { expected: 2, found })?;

        let settled = settlement.settle(pair, request)?;
        if settled.pair.sender.id != request.sender_balance_id()
            || settled.pair.receiver.id != request.receiver_balance_id()
        {
            return Err(TransferError::inconsistent(
                "settlement swapped the balance pair",
            ));
        }
        Ok(settled)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn update_balances(
        &self,
        ids: &[BalanceId],
        mutation: &dyn BalanceMutation,
    ) -> Result<Vec<Balance>, TransferError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let ids = distinct_ids(ids);
        tracing::debug!(mutation = mutation.name(), ?ids, "Updating balances");
        let mut state = self.state.lock().await;

        let mutated = match Self::stage_update(&state, &ids, mutation) {
            Ok(mutated) => mutated,
            Err(cause) => return Err(self.rollback(cause)),
        };

        if self.take_update_fault() {
            return Err(StorageError::Commit(injected("commit")).into());
        }

        for balance in &mutated {
            state.balances.insert(balance.id, balance.clone());
        }
        Ok(mutated)
    }

    async fn make_transaction(
        &self,
        request: &TransferRequest,
        settlement: &dyn Settlement,
    ) -> Result<Transaction, TransferError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().await;

        if self.take_transaction_fault() {
            let cause = StorageError::Database(injected("read")).into();
            return Err(self.rollback(cause));
        }

        let Settled { pair, occurred_at } =
            match Self::stage_settlement(&state, request, settlement) {
                Ok(settled) => settled,
                Err(cause) => return Err(self.rollback(cause)),
            };

        state.next_transaction_id += 1;
        let transaction = Transaction {
            id: state.next_transaction_id,
            sender_balance_id: request.sender_balance_id(),
            receiver_balance_id: request.receiver_balance_id(),
            amount: request.amount().value(),
            currency: request.currency(),
            occurred_at,
        };

        state.links.push((pair.sender.id, transaction.id));
        state.links.push((pair.receiver.id, transaction.id));
        for balance in pair.into_vec() {
            state.balances.insert(balance.id, balance);
        }
        state.transactions.push(transaction.clone());

        Ok(transaction)
    }

    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>, TransferError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .values()
            .filter(|b| b.is_owned_by(user_id))
            .cloned()
            .collect())
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, TransferError> {
        let state = self.state.lock().await;

        let mut ids: Vec<TransactionId> = state
            .links
            .iter()
            .filter(|(balance_id, _)| {
                state
                    .balances
                    .get(balance_id)
                    .is_some_and(|b| b.is_owned_by(user_id))
            })
            .map(|(_, transaction_id)| *transaction_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| ids.binary_search(&t.id).is_ok())
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(b.id.cmp(&a.id)));

        Ok(transactions)
    }

    async fn locked_balances(&self) -> Result<Vec<Balance>, TransferError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .values()
            .filter(|b| b.is_locked())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    struct LockAll;

    impl BalanceMutation for LockAll {
        fn name(&self) -> &'static str {
            "lock_all"
        }

        fn apply(&self, mut balances: Vec<Balance>) -> Result<Vec<Balance>, TransferError> {
            balances.iter_mut().for_each(Balance::lock);
            Ok(balances)
        }
    }

    struct Reject;

    impl BalanceMutation for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn apply(&self, _balances: Vec<Balance>) -> Result<Vec<Balance>, TransferError> {
            Err(TransferError::Conflict)
        }
    }

    struct MoveAmount;

    impl Settlement for MoveAmount {
        fn settle(
            &self,
            mut pair: BalancePair,
            request: &TransferRequest,
        ) -> Result<Settled, TransferError> {
            pair.sender.debit(request.amount());
            pair.receiver.credit(request.amount());
            Ok(Settled {
                pair,
                occurred_at: chrono::Utc::now(),
            })
        }
    }

    fn repo() -> InMemoryLedgerRepository {
        InMemoryLedgerRepository::with_balances([
            Balance::new(1, 10, Currency::Sgd, dec!(100)),
            Balance::new(2, 20, Currency::Sgd, dec!(5)),
        ])
    }

    #[tokio::test]
    async fn test_update_commits_mutation() {
        let repo = repo();
        let updated = repo.update_balances(&[2, 1, 2], &LockAll).await.unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].id, 2);
        assert!(repo.balance(1).await.unwrap().locked);
        assert!(repo.balance(2).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_update_missing_balance_is_not_found() {
        let repo = repo();
        let err = repo.update_balances(&[1, 999], &LockAll).await.unwrap_err();

        assert!(matches!(err, TransferError::NotFound { .. }));
        assert!(!repo.balance(1).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_mutation_error_propagates_unchanged() {
        let repo = repo();
        let err = repo.update_balances(&[1, 2], &Reject).await.unwrap_err();
        assert!(matches!(err, TransferError::Conflict));
    }

    #[tokio::test]
    async fn test_commit_fault_discards_changes() {
        let repo = repo();
        repo.fail_next_updates(1);

        let err = repo.update_balances(&[1, 2], &LockAll).await.unwrap_err();
        assert!(matches!(err, TransferError::Storage(StorageError::Commit(_))));
        assert!(!repo.balance(1).await.unwrap().locked);

        assert!(repo.update_balances(&[1, 2], &LockAll).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_cause() {
        let repo = repo();
        repo.fail_rollbacks(true);

        let err = repo.update_balances(&[1, 2], &Reject).await.unwrap_err();
        match err {
            TransferError::Storage(storage) => {
                assert!(matches!(storage.rollback_cause(), Some(TransferError::Conflict)));
            }
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_make_transaction_records_and_links() {
        let repo = repo();
        let request = TransferRequest::new(1, 2, dec!(30), Currency::Sgd).unwrap();

        let tx = repo.make_transaction(&request, &MoveAmount).await.unwrap();
        assert_eq!(tx.id, 1);
        assert_eq!(repo.balance(1).await.unwrap().amount, dec!(70));
        assert_eq!(repo.balance(2).await.unwrap().amount, dec!(35));

        assert_eq!(repo.transactions_for_user(10).await.unwrap().len(), 1);
        assert_eq!(repo.transactions_for_user(20).await.unwrap().len(), 1);
        assert!(repo.transactions_for_user(30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transactions_between_own_balances_listed_once() {
        let repo = InMemoryLedgerRepository::with_balances([
            Balance::new(1, 10, Currency::Sgd, dec!(100)),
            Balance::new(2, 10, Currency::Sgd, dec!(0)),
        ]);
        let request = TransferRequest::new(1, 2, dec!(1), Currency::Sgd).unwrap();
        repo.make_transaction(&request, &MoveAmount).await.unwrap();
        repo.make_transaction(&request, &MoveAmount).await.unwrap();

        let listed = repo.transactions_for_user(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id > listed[1].id);
    }

    #[tokio::test]
    async fn test_transaction_fault_records_nothing() {
        let repo = repo();
        repo.fail_next_transaction();
        let request = TransferRequest::new(1, 2, dec!(30), Currency::Sgd).unwrap();

        let err = repo.make_transaction(&request, &MoveAmount).await.unwrap_err();
        assert!(matches!(err, TransferError::Storage(StorageError::Database(_))));
        assert_eq!(repo.transaction_count().await, 0);
        assert_eq!(repo.balance(1).await.unwrap().amount, dec!(100));
    }
}
