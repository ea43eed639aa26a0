//! Postgres Ledger Repository
//!
//! Each primitive runs in one sqlx transaction. Balance writes are
//! check-and-set on the `locked` flag read in the same unit of work, so two
//! units of work racing on a balance cannot both succeed: the loser updates
//! zero rows and fails with `Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};

use crate::domain::{
    Balance, BalanceId, BalancePair, Currency, Transaction, TransferError, TransferRequest, UserId,
};

use super::repository::{
    check_mutated, distinct_ids, order_by_ids, BalanceMutation, LedgerRepository, Settlement,
};
use super::StorageError;

type BalanceRow = (i64, i64, String, Decimal, bool);
type TransactionRow = (i64, i64, i64, Decimal, String, DateTime<Utc>);

fn parse_currency(code: &str) -> Result<Currency, StorageError> {
    code.parse()
        .map_err(|_| StorageError::CorruptRow(format!("unknown currency code {code:?}")))
}

fn balance_from_row(row: BalanceRow) -> Result<Balance, StorageError> {
    let (id, owner_user_id, currency, amount, locked) = row;
    Ok(Balance {
        id,
        owner_user_id,
        currency: parse_currency(&currency)?,
        amount,
        locked,
    })
}

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, StorageError> {
    let (id, sender_balance_id, receiver_balance_id, amount, currency, occurred_at) = row;
    Ok(Transaction {
        id,
        sender_balance_id,
        receiver_balance_id,
        amount,
        currency: parse_currency(&currency)?,
        occurred_at,
    })
}

fn in_id_order(mut writes: Vec<(&Balance, bool)>) -> Vec<(&Balance, bool)> {
    writes.sort_by_key(|(balance, _)| balance.id);
    writes
}

/// Ledger repository backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<PgTransaction<'static, Postgres>, TransferError> {
        Ok(self.pool.begin().await.map_err(StorageError::from)?)
    }

    /// Commit on success, roll back on failure. A failed rollback wraps the
    /// original error instead of replacing it.
    async fn finish<T>(
        tx: PgTransaction<'_, Postgres>,
        result: Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        match result {
            Ok(value) => {
                tx.commit().await.map_err(StorageError::Commit)?;
                Ok(value)
            }
            Err(cause) => match tx.rollback().await {
                Ok(()) => Err(cause),
                Err(rollback) => {
                    tracing::error!(error = %rollback, cause = %cause, "Ledger rollback failed");
                    Err(StorageError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback,
                    }
                    .into())
                }
            },
        }
    }

    async fn fetch_balances(
        tx: &mut PgTransaction<'_, Postgres>,
        ids: &[BalanceId],
    ) -> Result<Vec<Balance>, TransferError> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, owner_user_id, currency, amount, locked
            FROM balances
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(balance_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Persist amount and lock flag, conditional on the flag still being
    /// `expected_locked`.
    async fn write_balance(
        tx: &mut PgTransaction<'_, Postgres>,
        balance: &Balance,
        expected_locked: bool,
    ) -> Result<(), TransferError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE balances
            SET amount = $2, locked = $3, updated_at = NOW()
            WHERE id = $1 AND locked = $4
            "#,
        )
        .bind(balance.id)
        .bind(balance.amount)
        .bind(balance.locked)
        .bind(expected_locked)
        .execute(&mut **tx)
        .await
        .map_err(StorageError::from)?
        .rows_affected();

        if rows_affected == 0 {
            tracing::debug!(balance_id = balance.id, "Lock flag changed under us");
            return Err(TransferError::Conflict);
        }
        Ok(())
    }

    /// Write each balance conditional on its expected lock flag, in ascending
    /// id order. Every unit of work touching the same rows takes their row
    /// locks in the same order, so opposite-direction transfers cannot deadlock.
    async fn write_in_id_order(
        tx: &mut PgTransaction<'_, Postgres>,
        writes: Vec<(&Balance, bool)>,
    ) -> Result<(), TransferError> {
        for (balance, expected_locked) in in_id_order(writes) {
            Self::write_balance(tx, balance, expected_locked).await?;
        }
        Ok(())
    }

    async fn update_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        ids: &[BalanceId],
        mutation: &dyn BalanceMutation,
    ) -> Result<Vec<Balance>, TransferError> {
        tracing::debug!(mutation = mutation.name(), ?ids, "Updating balances");
        let fetched = order_by_ids(ids, Self::fetch_balances(tx, ids).await?)?;
        let read_flags: Vec<(BalanceId, bool)> =
            fetched.iter().map(|b| (b.id, b.locked)).collect();

        let mutated = mutation.apply(fetched)?;
        check_mutated(ids, &mutated)?;

        let writes = mutated
            .iter()
            .map(|balance| {
                let expected = read_flags
                    .iter()
                    .find(|(id, _)| *id == balance.id)
                    .map(|(_, locked)| *locked)
                    .unwrap_or_default();
                (balance, expected)
            })
            .collect();
        Self::write_in_id_order(tx, writes).await?;

        Ok(mutated)
    }

    async fn settle_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        request: &TransferRequest,
        settlement: &dyn Settlement,
    ) -> Result<Transaction, TransferError> {
        let ids = request.balance_ids();
        let fetched = Self::fetch_balances(tx, &ids).await?;
        let found = fetched.len();
        let pair = BalancePair::from_fetched(
            fetched,
            request.sender_balance_id(),
            request.receiver_balance_id(),
        )
        .ok_or(TransferError::NotFound { expected: 2, found })?;
        let sender_was_locked = pair.sender.locked;
        let receiver_was_locked = pair.receiver.locked;

        let settled = settlement.settle(pair, request)?;
        if settled.pair.sender.id != request.sender_balance_id()
            || settled.pair.receiver.id != request.receiver_balance_id()
        {
            return Err(TransferError::inconsistent(
                "settlement swapped the balance pair",
            ));
        }

        let amount = request.amount();
        let row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions (sender_balance_id, receiver_balance_id, amount, currency, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sender_balance_id, receiver_balance_id, amount, currency, occurred_at
            "#,
        )
        .bind(request.sender_balance_id())
        .bind(request.receiver_balance_id())
        .bind(amount.value())
        .bind(amount.currency().code())
        .bind(settled.occurred_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(StorageError::from)?;
        let transaction = transaction_from_row(row)?;

        sqlx::query(
            r#"
            INSERT INTO balance_transactions (balance_id, transaction_id)
            VALUES ($1, $3), ($2, $3)
            "#,
        )
        .bind(request.sender_balance_id())
        .bind(request.receiver_balance_id())
        .bind(transaction.id)
        .execute(&mut **tx)
        .await
        .map_err(StorageError::from)?;

        Self::write_in_id_order(
            tx,
            vec![
                (&settled.pair.sender, sender_was_locked),
                (&settled.pair.receiver, receiver_was_locked),
            ],
        )
        .await?;

        Ok(transaction)
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn update_balances(
        &self,
        ids: &[BalanceId],
        mutation: &dyn BalanceMutation,
    ) -> Result<Vec<Balance>, TransferError> {
        let ids = distinct_ids(ids);
        let mut tx = self.begin().await?;
        let result = Self::update_in_tx(&mut tx, &ids, mutation).await;
        Self::finish(tx, result).await
    }

    async fn make_transaction(
        &self,
        request: &TransferRequest,
        settlement: &dyn Settlement,
    ) -> Result<Transaction, TransferError> {
        let mut tx = self.begin().await?;
        let result = Self::settle_in_tx(&mut tx, request, settlement).await;
        Self::finish(tx, result).await
    }

    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>, TransferError> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, owner_user_id, currency, amount, locked
            FROM balances
            WHERE owner_user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(balance_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, TransferError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT t.id, t.sender_balance_id, t.receiver_balance_id,
                   t.amount, t.currency, t.occurred_at
            FROM transactions t
            JOIN balance_transactions bt ON bt.transaction_id = t.id
            JOIN balances b ON b.id = bt.balance_id
            WHERE b.owner_user_id = $1
            ORDER BY t.occurred_at DESC, t.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn locked_balances(&self) -> Result<Vec<Balance>, TransferError> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, owner_user_id, currency, amount, locked
            FROM balances
            WHERE locked
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(balance_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_from_row() {
        let balance = balance_from_row((1, 7, "SGD".to_string(), dec!(1000.00), true)).unwrap();
        assert_eq!(balance.id, 1);
        assert_eq!(balance.owner_user_id, 7);
        assert_eq!(balance.currency, Currency::Sgd);
        assert!(balance.locked);
    }

    #[test]
    fn test_writes_follow_ascending_id_order() {
        let low = Balance::new(1, 7, Currency::Sgd, dec!(10));
        let high = Balance::new(2, 8, Currency::Sgd, dec!(10));

        // Receiver before sender when the transfer runs from the higher id
        let ordered = in_id_order(vec![(&high, false), (&low, true)]);
        assert_eq!(ordered[0].0.id, 1);
        assert!(ordered[0].1);
        assert_eq!(ordered[1].0.id, 2);
        assert!(!ordered[1].1);

        let ordered = in_id_order(vec![(&low, false), (&high, false)]);
        assert_eq!(ordered[0].0.id, 1);
    }

    #[test]
    fn test_unknown_currency_is_corrupt_row() {
        let err = balance_from_row((1, 7, "XYZ".to_string(), dec!(1), false)).unwrap_err();
        assert!(matches!(err, StorageError::CorruptRow(_)));
    }
}
