//! Transfer Phase
//!
//! Per-attempt state of the acquire/apply/release protocol. The persisted
//! part of this state is the `locked` flag on both balances.

use std::fmt;

/// Phase of one transfer attempt over a balance pair
///
/// `Idle -> Locked -> Applied | Released`. An attempt whose release fails
/// ends in `Stuck`: both balances stay locked until an operator intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    /// Validated, nothing locked yet
    Idle,

    /// Both balances locked by this attempt
    Locked,

    /// Terminal: settled and unlocked in one unit of work
    Applied,

    /// Terminal: settlement failed, locks cleared
    Released,

    /// Terminal: settlement failed and the locks could not be cleared
    Stuck,
}

impl TransferPhase {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Applied | TransferPhase::Released | TransferPhase::Stuck
        )
    }

    /// True while this attempt owns the locks on its pair
    #[inline]
    pub fn holds_locks(&self) -> bool {
        matches!(self, TransferPhase::Locked | TransferPhase::Stuck)
    }

    pub fn can_transition_to(&self, next: TransferPhase) -> bool {
        matches!(
            (self, next),
            (TransferPhase::Idle, TransferPhase::Locked)
                | (TransferPhase::Locked, TransferPhase::Applied)
                | (TransferPhase::Locked, TransferPhase::Released)
                | (TransferPhase::Locked, TransferPhase::Stuck)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Idle => "IDLE",
            TransferPhase::Locked => "LOCKED",
            TransferPhase::Applied => "APPLIED",
            TransferPhase::Released => "RELEASED",
            TransferPhase::Stuck => "STUCK",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(TransferPhase::Applied.is_terminal());
        assert!(TransferPhase::Released.is_terminal());
        assert!(TransferPhase::Stuck.is_terminal());

        assert!(!TransferPhase::Idle.is_terminal());
        assert!(!TransferPhase::Locked.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(TransferPhase::Idle.can_transition_to(TransferPhase::Locked));
        assert!(TransferPhase::Locked.can_transition_to(TransferPhase::Applied));
        assert!(TransferPhase::Locked.can_transition_to(TransferPhase::Released));

        assert!(!TransferPhase::Idle.can_transition_to(TransferPhase::Applied));
        assert!(!TransferPhase::Applied.can_transition_to(TransferPhase::Released));
        assert!(!TransferPhase::Released.can_transition_to(TransferPhase::Locked));
    }

    #[test]
    fn test_lock_ownership() {
        assert!(TransferPhase::Locked.holds_locks());
        assert!(TransferPhase::Stuck.holds_locks());
        assert!(!TransferPhase::Applied.holds_locks());
        assert!(!TransferPhase::Released.holds_locks());
    }
}
