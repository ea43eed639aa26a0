//! walletLedger Library
//!
//! User balances and lock-guarded balance transfers. Re-exports modules for
//! the binary, integration tests and external use.

pub mod api;
pub mod auth;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod query;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, Currency, OperationContext, Transaction, TransferError, TransferRequest};
pub use error::{AppError, AppResult, ErrorResponse};
