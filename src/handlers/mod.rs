//! Command Handlers module
//!
//! The transfer orchestrator and the balance mutations it hands to the
//! ledger repository.

mod commands;
mod mutations;
mod state;
mod transfer_handler;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use mutations::{LockIfFree, SettleTransfer, UnlockIfLocked};
pub use state::TransferPhase;
pub use transfer_handler::TransferHandler;
