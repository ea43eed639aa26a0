//! Domain module
//!
//! Core domain types: money, balances, transactions and the transfer error
//! taxonomy.

pub mod amount;
pub mod balance;
pub mod context;
pub mod error;
pub mod transaction;

pub use amount::{Amount, AmountError, Currency};
pub use balance::{Balance, BalancePair};
pub use context::OperationContext;
pub use error::TransferError;
pub use transaction::{Transaction, TransferRequest};

pub type BalanceId = i64;
pub type UserId = i64;
pub type TransactionId = i64;
