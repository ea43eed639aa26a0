//! Ledger module
//!
//! Storage-facing side of the transfer protocol: the repository contract,
//! its Postgres and in-memory implementations, and storage errors.

mod error;
mod memory;
mod postgres;
mod repository;

pub use error::StorageError;
pub use memory::{InMemoryLedgerRepository, SettlementGate};
pub use postgres::PgLedgerRepository;
pub use repository::{BalanceMutation, LedgerRepository, Settled, Settlement};
