//! Loan book: the lifecycle state machine
//!
//! [`LoanBook`] owns every loan record and the id counter. Each mutating
//! operation follows the same shape:
//!
//! 1. Stage a copy of the loan after the existence and terminal checks
//! 2. Validate preconditions against the staged copy and the clock
//! 3. Execute the transfer plan (compensated on failure)
//! 4. Commit the staged copy
//!
//! Nothing is written back unless step 3 succeeded, so a failed operation
//! leaves no trace. The book takes `&mut self`; linearizability across
//! callers comes from the actor that owns it.

use crate::{
    clock::Clock,
    config::{CollateralRelease, PolicyConfig, RepaymentAuthorization},
    events::{LoanEvent, LoanEventKind},
    interest::{self, RepaymentQuote},
    transfer::{TransferPlan, ValueTransfer},
    types::{Amount, Loan, LoanId, PartyId},
    Error, Result,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Owner of all loan records
pub struct LoanBook {
    /// Loans by id
    loans: BTreeMap<LoanId, Loan>,

    /// Id handed to the next committed request
    next_id: LoanId,

    /// Policy points
    policy: PolicyConfig,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Money movement backend
    transfer: Arc<dyn ValueTransfer>,
}

impl fmt::Debug for LoanBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanBook")
            .field("loans", &self.loans.len())
            .field("next_id", &self.next_id)
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl LoanBook {
    /// Create empty book
    pub fn new(
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Self {
        Self {
            loans: BTreeMap::new(),
            next_id: LoanId::FIRST,
            policy,
            clock,
            transfer,
        }
    }

    /// Policy this book enforces
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Escrow collateral and open a loan request.
    ///
    /// The loan amount is half the collateral, floor division on base units.
    pub fn request_loan(
        &mut self,
        borrower: &PartyId,
        interest_rate: u32,
        duration_secs: u64,
        collateral: Amount,
    ) -> Result<LoanEvent> {
        if collateral.is_zero() {
            return Err(Error::InvalidAmount("Collateral must be positive".to_string()));
        }

        let id = self.next_id;
        let next_id = id
            .next()
            .ok_or_else(|| Error::Overflow("Loan id space exhausted".to_string()))?;
        let now = self.clock.now();

        let loan = Loan {
            id,
            borrower: borrower.clone(),
            lender: None,
            collateral_amount: collateral,
            loan_amount: interest::loan_amount_for(collateral),
            interest_rate,
            duration_secs,
            start_time: None,
            amount_repaid: Amount::ZERO,
            funded: false,
            repaid: false,
            claimed: false,
            created_at: now,
        };

        TransferPlan::new()
            .debit(borrower, collateral)
            .escrow_hold(collateral)
            .execute(self.transfer.as_ref())?;

        let event = LoanEvent::new(
            id,
            LoanEventKind::Requested {
                borrower: borrower.clone(),
                collateral_amount: loan.collateral_amount,
                loan_amount: loan.loan_amount,
                interest_rate,
                duration_secs,
            },
            now,
        );

        tracing::info!(
            loan_id = %id,
            %borrower,
            collateral = %loan.collateral_amount,
            loan_amount = %loan.loan_amount,
            "Loan requested"
        );

        self.loans.insert(id, loan);
        self.next_id = next_id;
        Ok(event)
    }

    /// Supply the loan amount; it passes straight through to the borrower.
    pub fn fund_loan(&mut self, id: LoanId, lender: &PartyId, amount: Amount) -> Result<LoanEvent> {
        let mut loan = self.stage(id)?;

        if loan.funded {
            return Err(Error::AlreadyFunded(id));
        }
        if amount != loan.loan_amount {
            return Err(Error::AmountMismatch {
                expected: loan.loan_amount,
                offered: amount,
            });
        }

        let now = self.clock.now();
        loan.lender = Some(lender.clone());
        loan.start_time = Some(now);
        loan.funded = true;

        TransferPlan::new()
            .debit(lender, amount)
            .credit(&loan.borrower, amount)
            .execute(self.transfer.as_ref())?;

        tracing::info!(loan_id = %id, %lender, %amount, "Loan funded");

        let event = LoanEvent::new(
            id,
            LoanEventKind::Funded {
                lender: lender.clone(),
                loan_amount: amount,
            },
            now,
        );
        self.commit(loan);
        Ok(event)
    }

    /// Pay part of the loan; the payment is forwarded to the lender.
    ///
    /// The running total is not capped at the obligation.
    pub fn partial_repayment(
        &mut self,
        id: LoanId,
        payer: &PartyId,
        amount: Amount,
    ) -> Result<LoanEvent> {
        let mut loan = self.stage(id)?;
        let lender = Self::lender_of(&loan)?;
        self.authorize_repayment(&loan, payer)?;

        if amount.is_zero() {
            return Err(Error::InvalidAmount("Repayment must be positive".to_string()));
        }

        loan.amount_repaid = loan
            .amount_repaid
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("amount repaid on loan {}", id)))?;

        TransferPlan::new()
            .debit(payer, amount)
            .credit(&lender, amount)
            .execute(self.transfer.as_ref())?;

        tracing::info!(
            loan_id = %id,
            %payer,
            %amount,
            amount_repaid = %loan.amount_repaid,
            "Partial repayment"
        );

        let event = LoanEvent::new(
            id,
            LoanEventKind::PartiallyRepaid {
                payer: payer.clone(),
                amount,
                amount_repaid: loan.amount_repaid,
            },
            self.clock.now(),
        );
        self.commit(loan);
        Ok(event)
    }

    /// Settle the loan with the early-repayment rebate applied.
    ///
    /// Any payment at or above the required amount is accepted and forwarded
    /// in full; the excess is not refunded.
    pub fn repay_loan(&mut self, id: LoanId, payer: &PartyId, amount: Amount) -> Result<LoanEvent> {
        let mut loan = self.stage(id)?;
        let lender = Self::lender_of(&loan)?;
        self.authorize_repayment(&loan, payer)?;

        let required = interest::required_final_payment(&loan)?;
        if amount < required {
            return Err(Error::InsufficientPayment {
                required,
                offered: amount,
            });
        }

        loan.repaid = true;

        let mut plan = TransferPlan::new().debit(payer, amount).credit(&lender, amount);
        let collateral_returned =
            self.policy.collateral_on_repayment == CollateralRelease::ReturnToBorrower;
        if collateral_returned {
            plan = plan.escrow_release(loan.collateral_amount, &loan.borrower);
        }
        plan.execute(self.transfer.as_ref())?;

        tracing::info!(
            loan_id = %id,
            %payer,
            %amount,
            %required,
            collateral_returned,
            "Loan repaid"
        );

        let event = LoanEvent::new(
            id,
            LoanEventKind::Repaid {
                payer: payer.clone(),
                amount,
                required,
                collateral_returned,
            },
            self.clock.now(),
        );
        self.commit(loan);
        Ok(event)
    }

    /// Forfeit the escrowed collateral to the lender after the deadline.
    ///
    /// Partial repayments already forwarded are not credited against it.
    pub fn claim_collateral(&mut self, id: LoanId, caller: &PartyId) -> Result<LoanEvent> {
        let mut loan = self.stage(id)?;
        let lender = Self::lender_of(&loan)?;

        if *caller != lender {
            return Err(Error::NotLender(id));
        }

        let now = self.clock.now();
        let deadline = loan.deadline();
        match deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Err(Error::DeadlineNotReached { loan_id: id, deadline }),
        }

        loan.claimed = true;

        TransferPlan::new()
            .escrow_release(loan.collateral_amount, &lender)
            .execute(self.transfer.as_ref())?;

        tracing::info!(
            loan_id = %id,
            %lender,
            collateral = %loan.collateral_amount,
            amount_repaid = %loan.amount_repaid,
            "Collateral claimed"
        );

        let event = LoanEvent::new(
            id,
            LoanEventKind::CollateralClaimed {
                lender,
                collateral_amount: loan.collateral_amount,
            },
            now,
        );
        self.commit(loan);
        Ok(event)
    }

    /// Committed loan snapshot
    pub fn get_loan(&self, id: LoanId) -> Result<Loan> {
        self.loans.get(&id).cloned().ok_or(Error::NotFound(id))
    }

    /// All loans ordered by id
    pub fn loans(&self) -> Vec<Loan> {
        self.loans.values().cloned().collect()
    }

    /// Number of loans ever created
    pub fn len(&self) -> usize {
        self.loans.len()
    }

    /// Check if no loan was created yet
    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// What a final repayment would cost right now
    pub fn repayment_quote(&self, id: LoanId) -> Result<RepaymentQuote> {
        let loan = self.stage(id)?;
        Self::lender_of(&loan)?;
        RepaymentQuote::for_loan(&loan)
    }

    /// Loans neither repaid nor claimed
    pub fn open_loans(&self) -> usize {
        self.loans.values().filter(|l| !l.is_resolved()).count()
    }

    /// Collateral the ledger still holds in escrow
    pub fn escrowed_collateral(&self) -> Amount {
        let returned_on_repay =
            self.policy.collateral_on_repayment == CollateralRelease::ReturnToBorrower;

        self.loans
            .values()
            .filter(|l| !l.claimed && !(l.repaid && returned_on_repay))
            .fold(Amount::ZERO, |acc, l| {
                // Escrow holds the sum of committed deposits, which fit by construction
                acc.checked_add(l.collateral_amount).unwrap_or(acc)
            })
    }

    /// Copy of an unresolved loan, ready for modification
    fn stage(&self, id: LoanId) -> Result<Loan> {
        let loan = self.loans.get(&id).ok_or(Error::NotFound(id))?;
        if loan.is_resolved() {
            return Err(Error::AlreadyResolved(id));
        }
        Ok(loan.clone())
    }

    fn commit(&mut self, loan: Loan) {
        self.loans.insert(loan.id, loan);
    }

    fn lender_of(loan: &Loan) -> Result<PartyId> {
        match (&loan.lender, loan.funded) {
            (Some(lender), true) => Ok(lender.clone()),
            _ => Err(Error::NotFunded(loan.id)),
        }
    }

    fn authorize_repayment(&self, loan: &Loan, payer: &PartyId) -> Result<()> {
        match self.policy.repayment_authorization {
            RepaymentAuthorization::AnyCaller => Ok(()),
            RepaymentAuthorization::BorrowerOnly if *payer == loan.borrower => Ok(()),
            RepaymentAuthorization::BorrowerOnly => Err(Error::NotBorrower(loan.id)),
        }
    }
}
