//! Transfer Handler
//!
//! Drives the three-step transfer protocol over the ledger repository:
//!
//! 1. acquire: lock both balances if free (`Conflict` otherwise)
//! 2. apply: settle and unlock in one unit of work
//! 3. release: only if step 2 failed, unlock both balances
//!
//! Each step is its own unit of work. The protocol runs on a spawned task so
//! that a caller going away after step 1 cannot leave the pair half done.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{BalanceId, OperationContext, Transaction, TransferError, TransferRequest, UserId};
use crate::ledger::LedgerRepository;

use super::mutations::{LockIfFree, SettleTransfer, UnlockIfLocked};
use super::state::TransferPhase;

/// Handler for balance transfers
#[derive(Clone)]
pub struct TransferHandler {
    ledger: Arc<dyn LedgerRepository>,
}

/// One attempt's progress through the protocol, logged on every transition
struct Attempt {
    phase: TransferPhase,
    sender: BalanceId,
    receiver: BalanceId,
}

impl Attempt {
    fn new(request: &TransferRequest) -> Self {
        Self {
            phase: TransferPhase::Idle,
            sender: request.sender_balance_id(),
            receiver: request.receiver_balance_id(),
        }
    }

    fn advance(&mut self, next: TransferPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transfer transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!(
            from = %self.phase,
            to = %next,
            sender_balance_id = self.sender,
            receiver_balance_id = self.receiver,
            "transfer.phase"
        );
        self.phase = next;

        if next.is_terminal() {
            tracing::info!(
                phase = %next,
                holds_locks = next.holds_locks(),
                sender_balance_id = self.sender,
                receiver_balance_id = self.receiver,
                "Transfer attempt finished"
            );
        }
    }
}

impl TransferHandler {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    /// Execute a transfer on behalf of `caller`
    pub async fn execute(
        &self,
        caller: UserId,
        request: TransferRequest,
    ) -> Result<Transaction, TransferError> {
        let context = OperationContext::new().with_caller(caller);
        self.execute_with_context(&context, request).await
    }

    /// Execute a transfer, tagging every log line with the context's correlation id
    pub async fn execute_with_context(
        &self,
        context: &OperationContext,
        request: TransferRequest,
    ) -> Result<Transaction, TransferError> {
        let caller = context.require_caller()?;
        let correlation_id = context.correlation_id.unwrap_or_else(Uuid::new_v4);

        let span = tracing::info_span!(
            "transfer",
            %correlation_id,
            caller,
            sender_balance_id = request.sender_balance_id(),
            receiver_balance_id = request.receiver_balance_id(),
            amount = %request.amount(),
        );

        let ledger = self.ledger.clone();
        tokio::spawn(Self::run(ledger, caller, request).instrument(span))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %correlation_id, "Transfer task did not complete");
                TransferError::inconsistent(format!("transfer task failed: {e}"))
            })?
    }

    async fn run(
        ledger: Arc<dyn LedgerRepository>,
        caller: UserId,
        request: TransferRequest,
    ) -> Result<Transaction, TransferError> {
        let ids = request.balance_ids();
        let mut attempt = Attempt::new(&request);

        // Step 1: nothing is held if this fails, so there is nothing to release
        if let Err(e) = ledger.update_balances(&ids, &LockIfFree).await {
            if e.is_conflict_error() || e.is_client_error() {
                tracing::info!(error = %e, code = e.code(), "Transfer not started");
            } else {
                tracing::warn!(error = %e, code = e.code(), "Transfer not started");
            }
            return Err(e);
        }
        attempt.advance(TransferPhase::Locked);

        // Step 2
        let apply_error = match ledger
            .make_transaction(&request, &SettleTransfer::new(caller))
            .await
        {
            Ok(transaction) => {
                attempt.advance(TransferPhase::Applied);
                tracing::info!(transaction_id = transaction.id, "Transfer completed");
                return Ok(transaction);
            }
            Err(e) => e,
        };

        log_settlement_failure(&apply_error);

        // Step 3
        match ledger.update_balances(&ids, &UnlockIfLocked).await {
            Ok(_) => {
                attempt.advance(TransferPhase::Released);
                Err(apply_error)
            }
            Err(release_error) => {
                attempt.advance(TransferPhase::Stuck);
                tracing::error!(
                    sender_balance_id = attempt.sender,
                    receiver_balance_id = attempt.receiver,
                    apply_error = %apply_error,
                    error = %release_error,
                    "Release failed, balances stuck locked"
                );
                Err(release_error)
            }
        }
    }
}

fn log_settlement_failure(error: &TransferError) {
    match error {
        TransferError::Storage(storage) if storage.is_fatal() => {
            tracing::error!(
                error = %storage,
                cause = ?storage.rollback_cause().map(TransferError::code),
                "Settlement rollback failed, releasing balances"
            );
        }
        e if e.is_client_error() => {
            tracing::info!(error = %e, code = e.code(), "Settlement rejected, releasing balances");
        }
        e => {
            tracing::warn!(error = %e, code = e.code(), "Settlement failed, releasing balances");
        }
    }
}
