//! Handler tests against the in-memory ledger

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::domain::{Balance, Currency, OperationContext, TransferError, TransferRequest};
    use crate::handlers::{TransferCommand, TransferHandler};
    use crate::ledger::{InMemoryLedgerRepository, StorageError};

    const ALICE: i64 = 10;
    const BOB: i64 = 20;

    fn setup(sender: Decimal, receiver: Decimal) -> (Arc<InMemoryLedgerRepository>, TransferHandler) {
        let repo = Arc::new(InMemoryLedgerRepository::with_balances([
            Balance::new(1, ALICE, Currency::Sgd, sender),
            Balance::new(2, BOB, Currency::Sgd, receiver),
        ]));
        let handler = TransferHandler::new(repo.clone());
        (repo, handler)
    }

    fn request(amount: Decimal) -> TransferRequest {
        TransferRequest::new(1, 2, amount, Currency::Sgd).unwrap()
    }

    #[tokio::test]
    async fn test_transfer_applies_and_unlocks() {
        let (repo, handler) = setup(dec!(1000.00), dec!(25.25));

        let tx = handler.execute(ALICE, request(dec!(11.49))).await.unwrap();

        assert_eq!(tx.sender_balance_id, 1);
        assert_eq!(tx.receiver_balance_id, 2);
        assert_eq!(tx.amount, dec!(11.49));
        let sender = repo.balance(1).await.unwrap();
        let receiver = repo.balance(2).await.unwrap();
        assert_eq!(sender.amount, dec!(988.51));
        assert_eq!(receiver.amount, dec!(36.74));
        assert!(!sender.locked && !receiver.locked);
        assert_eq!(repo.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_caller_is_rejected_before_storage() {
        let (repo, handler) = setup(dec!(100), dec!(0));

        let err = handler
            .execute_with_context(&OperationContext::new(), request(dec!(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(repo.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_command_validation_happens_before_storage() {
        let (repo, _handler) = setup(dec!(100), dec!(0));

        let err = TransferCommand::new(1, 1, "5".to_string())
            .into_request()
            .unwrap_err();

        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(repo.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_conflict_skips_apply_and_release() {
        let (repo, handler) = setup(dec!(100), dec!(0));
        repo.set_locked(2, true).await;

        let err = handler.execute(ALICE, request(dec!(1))).await.unwrap_err();

        assert!(matches!(err, TransferError::Conflict));
        assert_eq!(repo.update_calls(), 1);
        assert_eq!(repo.transaction_calls(), 0);
        assert!(!repo.balance(1).await.unwrap().locked);
        assert!(repo.balance(2).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_currency_mismatch_releases() {
        let (repo, handler) = setup(dec!(100), dec!(0));
        let usd = TransferRequest::new(1, 2, dec!(1), Currency::Usd).unwrap();

        let err = handler.execute(ALICE, usd).await.unwrap_err();

        assert!(matches!(err, TransferError::CurrencyMismatch { .. }));
        assert!(!repo.balance(1).await.unwrap().locked);
        assert!(!repo.balance(2).await.unwrap().locked);
        assert_eq!(repo.update_calls(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_in_apply_releases() {
        let (repo, handler) = setup(dec!(100), dec!(0));
        repo.fail_next_transaction();

        let err = handler.execute(ALICE, request(dec!(1))).await.unwrap_err();

        assert!(matches!(err, TransferError::Storage(StorageError::Database(_))));
        assert!(!repo.balance(1).await.unwrap().locked);
        assert!(!repo.balance(2).await.unwrap().locked);
        assert_eq!(repo.balance(1).await.unwrap().amount, dec!(100));
        assert_eq!(repo.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_bob_cannot_spend_alice_balance() {
        let (repo, handler) = setup(dec!(100), dec!(0));

        let err = handler.execute(BOB, request(dec!(1))).await.unwrap_err();

        assert!(matches!(err, TransferError::Unauthorized { caller: BOB, .. }));
        assert_eq!(repo.balance(1).await.unwrap().amount, dec!(100));
        assert!(!repo.balance(1).await.unwrap().locked);
    }
}
