//! Shared application state handed to every route

use std::sync::Arc;

use crate::auth::AuthService;
use super::metrics::HttpMetrics;
use crate::handlers::TransferHandler;
use crate::ledger::LedgerRepository;
use crate::query::BalanceQueryService;

#[derive(Clone)]
pub struct AppState {
    pub transfers: TransferHandler,
    pub queries: BalanceQueryService,
    pub auth: AuthService,
    pub metrics: HttpMetrics,
}

impl AppState {
    /// Wire the transfer and query services over one ledger
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        auth: AuthService,
        metrics: HttpMetrics,
    ) -> Self {
        Self {
            transfers: TransferHandler::new(ledger.clone()),
            queries: BalanceQueryService::new(ledger),
            auth,
            metrics,
        }
    }
}
