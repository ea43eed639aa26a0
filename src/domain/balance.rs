//! Balance entity
//!
//! A user-owned monetary account row carrying the single-writer `locked` flag.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::{Amount, Currency};
use super::{BalanceId, UserId};

/// A user's balance in one currency.
///
/// `locked = true` means an in-flight transfer owns this row; no other
/// transfer may acquire it until the owner applies or releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub owner_user_id: UserId,
    pub currency: Currency,
    pub amount: Decimal,
    pub locked: bool,
}

impl Balance {
    pub fn new(id: BalanceId, owner_user_id: UserId, currency: Currency, amount: Decimal) -> Self {
        Self {
            id,
            owner_user_id,
            currency,
            amount,
            locked: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_user_id == user_id
    }

    /// Strictly greater: a transfer may never drain a balance to exactly zero.
    pub fn covers(&self, amount: &Amount) -> bool {
        self.amount > amount.value()
    }

    pub fn credit(&mut self, amount: &Amount) {
        self.amount += amount.value();
    }

    pub fn debit(&mut self, amount: &Amount) {
        self.amount -= amount.value();
    }
}

/// Sender and receiver balances of one transfer, in role order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancePair {
    pub sender: Balance,
    pub receiver: Balance,
}

impl BalancePair {
    pub fn new(sender: Balance, receiver: Balance) -> Self {
        Self { sender, receiver }
    }

    /// Assign roles by id, independent of the order the rows were fetched in.
    pub fn from_fetched(
        mut fetched: Vec<Balance>,
        sender_id: BalanceId,
        receiver_id: BalanceId,
    ) -> Option<Self> {
        let sender_idx = fetched.iter().position(|b| b.id == sender_id)?;
        let sender = fetched.swap_remove(sender_idx);
        let receiver_idx = fetched.iter().position(|b| b.id == receiver_id)?;
        let receiver = fetched.swap_remove(receiver_idx);
        Some(Self { sender, receiver })
    }

    pub fn both_locked(&self) -> bool {
        self.sender.is_locked() && self.receiver.is_locked()
    }

    pub fn into_vec(self) -> Vec<Balance> {
        vec![self.sender, self.receiver]
    }
}
