//! Loan arithmetic
//!
//! All figures are computed on base units with truncating integer division,
//! in a fixed order: the rebated interest is `loan_amount * rate / 100 / 2`.

use crate::types::{Amount, Loan};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Loan amount granted against a collateral deposit (floor of half)
pub fn loan_amount_for(collateral: Amount) -> Amount {
    Amount::from_base_units(collateral.base_units() / 2)
}

/// Full interest owed: `loan_amount * rate / 100`
pub fn full_interest(loan_amount: Amount, interest_rate: u32) -> Result<Amount> {
    loan_amount
        .checked_mul(u128::from(interest_rate))
        .and_then(|v| v.checked_div(100))
        .ok_or_else(|| Error::Overflow(format!("interest on {} at {}%", loan_amount, interest_rate)))
}

/// Interest after the early-repayment rebate (half of the full interest)
pub fn rebated_interest(loan_amount: Amount, interest_rate: u32) -> Result<Amount> {
    let full = full_interest(loan_amount, interest_rate)?;
    Ok(Amount::from_base_units(full.base_units() / 2))
}

/// Final payment required by `repay_loan`, never below zero
pub fn required_final_payment(loan: &Loan) -> Result<Amount> {
    Ok(RepaymentQuote::for_loan(loan)?.required_payment)
}

/// Breakdown of what settling a loan costs right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentQuote {
    /// Principal
    pub loan_amount: Amount,

    /// Interest without rebate
    pub full_interest: Amount,

    /// Interest with the early-repayment rebate applied
    pub rebated_interest: Amount,

    /// Principal plus rebated interest
    pub total_obligation: Amount,

    /// Already paid through partial repayments
    pub amount_repaid: Amount,

    /// Remaining amount a final repayment must cover
    pub required_payment: Amount,
}

impl RepaymentQuote {
    /// Quote the final settlement of a loan
    pub fn for_loan(loan: &Loan) -> Result<Self> {
        let full_interest = full_interest(loan.loan_amount, loan.interest_rate)?;
        let rebated_interest = rebated_interest(loan.loan_amount, loan.interest_rate)?;
        let total_obligation = loan
            .loan_amount
            .checked_add(rebated_interest)
            .ok_or_else(|| Error::Overflow(format!("obligation of loan {}", loan.id)))?;

        Ok(Self {
            loan_amount: loan.loan_amount,
            full_interest,
            rebated_interest,
            total_obligation,
            amount_repaid: loan.amount_repaid,
            // Partial payments may already exceed the obligation
            required_payment: total_obligation.saturating_sub(loan.amount_repaid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoanId, PartyId};
    use chrono::Utc;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn funded_loan(collateral: Amount, rate: u32, repaid: Amount) -> Loan {
        Loan {
            id: LoanId::FIRST,
            borrower: PartyId::new("borrower"),
            lender: Some(PartyId::new("lender")),
            collateral_amount: collateral,
            loan_amount: loan_amount_for(collateral),
            interest_rate: rate,
            duration_secs: 3600,
            start_time: Some(Utc::now()),
            amount_repaid: repaid,
            funded: true,
            repaid: false,
            claimed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_loan_amount_floor() {
        assert_eq!(loan_amount_for(amount("1")), amount("0.5"));
        assert_eq!(
            loan_amount_for(Amount::from_base_units(7)),
            Amount::from_base_units(3)
        );
        assert_eq!(loan_amount_for(Amount::from_base_units(1)), Amount::ZERO);
    }

    #[test]
    fn test_early_repayment_example() {
        let loan = funded_loan(amount("1"), 10, amount("0.4"));
        let quote = RepaymentQuote::for_loan(&loan).unwrap();

        assert_eq!(quote.full_interest, amount("0.05"));
        assert_eq!(quote.rebated_interest, amount("0.025"));
        assert_eq!(quote.total_obligation, amount("0.525"));
        assert_eq!(quote.required_payment, amount("0.125"));
    }

    #[test]
    fn test_rebate_truncates() {
        // 67 * 3 / 100 = 2, / 2 = 1
        let loan = Amount::from_base_units(67);
        assert_eq!(full_interest(loan, 3).unwrap(), Amount::from_base_units(2));
        assert_eq!(rebated_interest(loan, 3).unwrap(), Amount::from_base_units(1));

        // 199 / 100 = 1, / 2 = 0
        let loan = Amount::from_base_units(199);
        assert_eq!(rebated_interest(loan, 1).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_required_payment_never_negative() {
        let loan = funded_loan(amount("1"), 10, amount("2"));
        assert_eq!(required_final_payment(&loan).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_zero_interest() {
        let loan = funded_loan(amount("2"), 0, Amount::ZERO);
        assert_eq!(required_final_payment(&loan).unwrap(), amount("1"));
    }

    #[test]
    fn test_interest_overflow() {
        let huge = Amount::from_base_units(u128::MAX / 2);
        assert!(matches!(full_interest(huge, 10), Err(Error::Overflow(_))));
    }
}
