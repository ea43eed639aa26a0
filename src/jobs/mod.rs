//! Scheduled Jobs
//!
//! Background sweep that makes stuck balance locks operator-visible. A lock
//! left behind by a crash between transfer steps is never cleared here; it is
//! only reported.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::domain::{BalanceId, TransferError};
use crate::ledger::LedgerRepository;

/// Configuration for the lock monitor
#[derive(Debug, Clone)]
pub struct LockMonitorConfig {
    /// Time between sweeps (default: 1 minute)
    pub interval: Duration,
}

impl Default for LockMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Default)]
pub struct LockSweepReport {
    /// Balances locked right now
    pub locked: Vec<BalanceId>,
    /// Balances locked in this sweep and the previous one
    pub suspected_stuck: Vec<BalanceId>,
    pub completed_at: DateTime<Utc>,
}

/// Periodically lists locked balances and warns about ones that stay locked
/// across two consecutive sweeps
pub struct LockMonitor {
    ledger: Arc<dyn LedgerRepository>,
    config: LockMonitorConfig,
    previously_locked: BTreeSet<BalanceId>,
}

impl LockMonitor {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self::with_config(ledger, LockMonitorConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn LedgerRepository>, config: LockMonitorConfig) -> Self {
        Self {
            ledger,
            config,
            previously_locked: BTreeSet::new(),
        }
    }

    /// Start the monitor in the background
    /// Returns a handle that can be used to abort it
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_secs = self.config.interval.as_secs(), "Lock monitor started");
            let mut ticker = interval(self.config.interval);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!(error = %e, "Lock sweep failed");
                }
            }
        })
    }

    /// Run one sweep (also used directly by tests)
    pub async fn sweep(&mut self) -> Result<LockSweepReport, JobError> {
        let locked: BTreeSet<BalanceId> = self
            .ledger
            .locked_balances()
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();

        let suspected_stuck: Vec<BalanceId> =
            locked.intersection(&self.previously_locked).copied().collect();

        for balance_id in &suspected_stuck {
            tracing::warn!(
                balance_id,
                interval_secs = self.config.interval.as_secs(),
                "Balance locked across consecutive sweeps, possibly stuck"
            );
        }
        if !locked.is_empty() {
            tracing::debug!(count = locked.len(), "Locked balances seen");
        }

        let report = LockSweepReport {
            locked: locked.iter().copied().collect(),
            suspected_stuck,
            completed_at: Utc::now(),
        };
        self.previously_locked = locked;
        Ok(report)
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] TransferError),
}

// =========================================================================
// Tests
// =========================================================================
