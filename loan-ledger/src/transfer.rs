//! Value transfer seam
//!
//! The ledger never touches balances itself. Every money movement is a
//! [`Leg`] executed through a [`ValueTransfer`] implementation, grouped into
//! a [`TransferPlan`] that either applies completely or is compensated.
//!
//! # Plans
//!
//! ```text
//! request_loan      debit(borrower, collateral) → escrow_hold(collateral)
//! fund_loan         debit(lender, loan)         → credit(borrower, loan)
//! partial_repayment debit(payer, amount)        → credit(lender, amount)
//! repay_loan        debit(payer, amount)        → credit(lender, amount)
//!                   [→ escrow_release(collateral, borrower)]
//! claim_collateral  escrow_release(collateral, lender)
//! ```
//!
//! Escrow legs always come last, so only debits and credits are ever
//! compensated.

use crate::types::{Amount, PartyId};
use crate::{Error, Result};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use thiserror::Error;

/// Failure reported by a value transfer backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Account cannot cover a debit
    #[error("Insufficient balance on {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Debited account
        account: PartyId,
        /// Requested amount
        needed: Amount,
        /// Current balance
        available: Amount,
    },

    /// Escrow holds less than the release amount
    #[error("Escrow shortfall: needed {needed}, held {held}")]
    EscrowShortfall {
        /// Requested release
        needed: Amount,
        /// Current escrow balance
        held: Amount,
    },

    /// Balance would overflow
    #[error("Balance overflow on {0}")]
    Overflow(String),

    /// Backend refused the movement
    #[error("Transfer rejected for {account}: {reason}")]
    Rejected {
        /// Affected account
        account: PartyId,
        /// Backend reason
        reason: String,
    },
}

/// Moves value between party accounts and the ledger escrow.
///
/// Each call is atomic: it either applies fully or returns an error with no
/// effect.
pub trait ValueTransfer: Send + Sync {
    /// Add value to an account
    fn credit(&self, account: &PartyId, amount: Amount) -> std::result::Result<(), TransferError>;

    /// Remove value from an account
    fn debit(&self, account: &PartyId, amount: Amount) -> std::result::Result<(), TransferError>;

    /// Take value into ledger custody
    fn escrow_hold(&self, amount: Amount) -> std::result::Result<(), TransferError>;

    /// Release value from ledger custody to an account
    fn escrow_release(
        &self,
        amount: Amount,
        to: &PartyId,
    ) -> std::result::Result<(), TransferError>;
}

/// Single money movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leg {
    /// Remove value from an account
    Debit {
        /// Account
        account: PartyId,
        /// Amount
        amount: Amount,
    },
    /// Add value to an account
    Credit {
        /// Account
        account: PartyId,
        /// Amount
        amount: Amount,
    },
    /// Take value into escrow
    EscrowHold {
        /// Amount
        amount: Amount,
    },
    /// Release value from escrow
    EscrowRelease {
        /// Amount
        amount: Amount,
        /// Receiving account
        to: PartyId,
    },
}

impl Leg {
    /// Apply this leg
    pub fn apply(&self, transfer: &dyn ValueTransfer) -> std::result::Result<(), TransferError> {
        match self {
            Leg::Debit { account, amount } => transfer.debit(account, *amount),
            Leg::Credit { account, amount } => transfer.credit(account, *amount),
            Leg::EscrowHold { amount } => transfer.escrow_hold(*amount),
            Leg::EscrowRelease { amount, to } => transfer.escrow_release(*amount, to),
        }
    }

    /// Leg undoing this one, `None` for escrow legs
    pub fn reversal(&self) -> Option<Leg> {
        match self {
            Leg::Debit { account, amount } => Some(Leg::Credit {
                account: account.clone(),
                amount: *amount,
            }),
            Leg::Credit { account, amount } => Some(Leg::Debit {
                account: account.clone(),
                amount: *amount,
            }),
            Leg::EscrowHold { .. } | Leg::EscrowRelease { .. } => None,
        }
    }
}

/// Ordered list of legs applied as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    legs: Vec<Leg>,
}

impl TransferPlan {
    /// Empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a debit
    pub fn debit(mut self, account: &PartyId, amount: Amount) -> Self {
        self.push(Leg::Debit {
            account: account.clone(),
            amount,
        });
        self
    }

    /// Append a credit
    pub fn credit(mut self, account: &PartyId, amount: Amount) -> Self {
        self.push(Leg::Credit {
            account: account.clone(),
            amount,
        });
        self
    }

    /// Append an escrow hold
    pub fn escrow_hold(mut self, amount: Amount) -> Self {
        self.push(Leg::EscrowHold { amount });
        self
    }

    /// Append an escrow release
    pub fn escrow_release(mut self, amount: Amount, to: &PartyId) -> Self {
        self.push(Leg::EscrowRelease {
            amount,
            to: to.clone(),
        });
        self
    }

    /// Legs in execution order
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    fn push(&mut self, leg: Leg) {
        let amount = match &leg {
            Leg::Debit { amount, .. }
            | Leg::Credit { amount, .. }
            | Leg::EscrowHold { amount }
            | Leg::EscrowRelease { amount, .. } => *amount,
        };
        // Zero movements are no-ops
        if !amount.is_zero() {
            self.legs.push(leg);
        }
    }

    /// Apply every leg in order.
    ///
    /// On the first failing leg the legs already applied are compensated in
    /// reverse order and the original failure is returned.
    pub fn execute(&self, transfer: &dyn ValueTransfer) -> Result<()> {
        for (applied, leg) in self.legs.iter().enumerate() {
            tracing::debug!(?leg, "Applying transfer leg");

            if let Err(err) = leg.apply(transfer) {
                tracing::warn!(?leg, error = %err, "Transfer leg failed, rolling back");
                Self::rollback(transfer, &self.legs[..applied])?;
                return Err(Error::Transfer(err));
            }
        }

        Ok(())
    }

    fn rollback(transfer: &dyn ValueTransfer, applied: &[Leg]) -> Result<()> {
        for leg in applied.iter().rev() {
            let reversal = leg.reversal().ok_or_else(|| {
                Error::RollbackFailed(format!("{:?} cannot be compensated", leg))
            })?;

            reversal.apply(transfer).map_err(|err| {
                tracing::error!(?leg, error = %err, "Compensation failed");
                Error::RollbackFailed(format!("{:?}: {}", leg, err))
            })?;
        }

        Ok(())
    }
}

/// In-memory value transfer backend
///
/// Used by tests and the demo node. Frozen accounts reject every movement,
/// which makes transfer failures easy to provoke.
#[derive(Debug, Default)]
pub struct InMemoryTransfer {
    balances: DashMap<PartyId, Amount>,
    escrow: Mutex<Amount>,
    frozen: DashSet<PartyId>,
}

impl InMemoryTransfer {
    /// Empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund an account from outside the ledger
    pub fn deposit(&self, account: &PartyId, amount: Amount) -> std::result::Result<(), TransferError> {
        self.credit(account, amount)
    }

    /// Current account balance
    pub fn balance(&self, account: &PartyId) -> Amount {
        self.balances
            .get(account)
            .map(|b| *b)
            .unwrap_or(Amount::ZERO)
    }

    /// Value currently held in escrow
    pub fn escrow_balance(&self) -> Amount {
        *self.escrow.lock()
    }

    /// Reject all movements touching `account`
    pub fn freeze(&self, account: &PartyId) {
        self.frozen.insert(account.clone());
    }

    /// Lift a freeze
    pub fn unfreeze(&self, account: &PartyId) {
        self.frozen.remove(account);
    }

    fn ensure_active(&self, account: &PartyId) -> std::result::Result<(), TransferError> {
        if self.frozen.contains(account) {
            return Err(TransferError::Rejected {
                account: account.clone(),
                reason: "account frozen".to_string(),
            });
        }
        Ok(())
    }
}

impl ValueTransfer for InMemoryTransfer {
    fn credit(&self, account: &PartyId, amount: Amount) -> std::result::Result<(), TransferError> {
        self.ensure_active(account)?;

        let mut balance = self.balances.entry(account.clone()).or_insert(Amount::ZERO);
        let next = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow(account.to_string()))?;
        *balance = next;
        Ok(())
    }

    fn debit(&self, account: &PartyId, amount: Amount) -> std::result::Result<(), TransferError> {
        self.ensure_active(account)?;

        let insufficient = |available: Amount| TransferError::InsufficientBalance {
            account: account.clone(),
            needed: amount,
            available,
        };

        let mut balance = self
            .balances
            .get_mut(account)
            .ok_or_else(|| insufficient(Amount::ZERO))?;
        let next = balance
            .checked_sub(amount)
            .ok_or_else(|| insufficient(*balance))?;
        *balance = next;
        Ok(())
    }

    fn escrow_hold(&self, amount: Amount) -> std::result::Result<(), TransferError> {
        let mut escrow = self.escrow.lock();
        *escrow = escrow
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow("escrow".to_string()))?;
        Ok(())
    }

    fn escrow_release(
        &self,
        amount: Amount,
        to: &PartyId,
    ) -> std::result::Result<(), TransferError> {
        let mut escrow = self.escrow.lock();
        let remaining = escrow.checked_sub(amount).ok_or(TransferError::EscrowShortfall {
            needed: amount,
            held: *escrow,
        })?;

        self.credit(to, amount)?;
        *escrow = remaining;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u128) -> Amount {
        Amount::from_base_units(n)
    }

    #[test]
    fn test_debit_insufficient_balance() {
        let transfer = InMemoryTransfer::new();
        let alice = PartyId::new("alice");
        transfer.deposit(&alice, units(10)).unwrap();

        let err = transfer.debit(&alice, units(11)).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientBalance {
                account: alice.clone(),
                needed: units(11),
                available: units(10),
            }
        );
        assert_eq!(transfer.balance(&alice), units(10));
    }

    #[test]
    fn test_escrow_round_trip() {
        let transfer = InMemoryTransfer::new();
        let bob = PartyId::new("bob");

        transfer.escrow_hold(units(100)).unwrap();
        assert_eq!(transfer.escrow_balance(), units(100));

        assert!(matches!(
            transfer.escrow_release(units(101), &bob),
            Err(TransferError::EscrowShortfall { .. })
        ));

        transfer.escrow_release(units(40), &bob).unwrap();
        assert_eq!(transfer.escrow_balance(), units(60));
        assert_eq!(transfer.balance(&bob), units(40));
    }

    #[test]
    fn test_escrow_release_to_frozen_account_keeps_escrow() {
        let transfer = InMemoryTransfer::new();
        let bob = PartyId::new("bob");
        transfer.escrow_hold(units(5)).unwrap();
        transfer.freeze(&bob);

        assert!(transfer.escrow_release(units(5), &bob).is_err());
        assert_eq!(transfer.escrow_balance(), units(5));
    }

    #[test]
    fn test_plan_skips_zero_legs() {
        let alice = PartyId::new("alice");
        let plan = TransferPlan::new()
            .debit(&alice, Amount::ZERO)
            .escrow_hold(units(1));
        assert_eq!(plan.legs().len(), 1);
    }

    #[test]
    fn test_plan_rolls_back_on_failure() {
        let transfer = InMemoryTransfer::new();
        let alice = PartyId::new("alice");
        let bob = PartyId::new("bob");
        transfer.deposit(&alice, units(50)).unwrap();
        transfer.freeze(&bob);

        let plan = TransferPlan::new().debit(&alice, units(20)).credit(&bob, units(20));
        let err = plan.execute(&transfer).unwrap_err();

        assert!(matches!(err, Error::Transfer(TransferError::Rejected { .. })));
        assert_eq!(transfer.balance(&alice), units(50));
        assert_eq!(transfer.balance(&bob), Amount::ZERO);
    }

    #[test]
    fn test_plan_rollback_failure_is_reported() {
        let transfer = InMemoryTransfer::new();
        let alice = PartyId::new("alice");
        transfer.deposit(&alice, units(5)).unwrap();

        // Escrow holds nothing, so the release fails after the hold applied
        let plan = TransferPlan::new()
            .escrow_hold(units(1))
            .escrow_release(units(2), &alice);
        let err = plan.execute(&transfer).unwrap_err();

        assert!(matches!(err, Error::RollbackFailed(_)));
    }

    #[test]
    fn test_leg_reversal() {
        let alice = PartyId::new("alice");
        let debit = Leg::Debit {
            account: alice.clone(),
            amount: units(3),
        };
        assert_eq!(
            debit.reversal(),
            Some(Leg::Credit {
                account: alice,
                amount: units(3),
            })
        );
        assert_eq!(Leg::EscrowHold { amount: units(3) }.reversal(), None);
    }
}
