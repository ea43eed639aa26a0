//! Query module
//!
//! Read-only views over the ledger for the authenticated caller.

mod service;

pub use service::BalanceQueryService;
