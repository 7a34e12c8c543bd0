//! Loan notifications published after each committed transition

use crate::types::{Amount, LoanId, LoanStatus, PartyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification of a committed loan transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Loan the event belongs to
    pub loan_id: LoanId,

    /// What happened
    pub kind: LoanEventKind,

    /// Clock reading at commit
    pub at: DateTime<Utc>,
}

impl LoanEvent {
    /// Create event for a loan
    pub fn new(loan_id: LoanId, kind: LoanEventKind, at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            loan_id,
            kind,
            at,
        }
    }

    /// Loan status right after this event
    pub fn status_after(&self) -> LoanStatus {
        match self.kind {
            LoanEventKind::Requested { .. } => LoanStatus::Requested,
            LoanEventKind::Funded { .. } | LoanEventKind::PartiallyRepaid { .. } => {
                LoanStatus::Funded
            }
            LoanEventKind::Repaid { .. } => LoanStatus::Repaid,
            LoanEventKind::CollateralClaimed { .. } => LoanStatus::Claimed,
        }
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanEventKind {
    /// Collateral escrowed and loan requested
    Requested {
        /// Borrower
        borrower: PartyId,
        /// Escrowed collateral
        collateral_amount: Amount,
        /// Loan amount on offer
        loan_amount: Amount,
        /// Interest rate in percent
        interest_rate: u32,
        /// Duration in seconds
        duration_secs: u64,
    },

    /// Lender supplied the loan amount to the borrower
    Funded {
        /// Lender
        lender: PartyId,
        /// Amount forwarded to the borrower
        loan_amount: Amount,
    },

    /// Payment forwarded to the lender without settling the loan
    PartiallyRepaid {
        /// Payer
        payer: PartyId,
        /// Payment
        amount: Amount,
        /// Running total after this payment
        amount_repaid: Amount,
    },

    /// Final payment received
    Repaid {
        /// Payer
        payer: PartyId,
        /// Payment forwarded to the lender
        amount: Amount,
        /// Amount the payment had to cover
        required: Amount,
        /// Whether collateral went back to the borrower
        collateral_returned: bool,
    },

    /// Collateral forfeited to the lender
    CollateralClaimed {
        /// Lender
        lender: PartyId,
        /// Released collateral
        collateral_amount: Amount,
    },
}

impl LoanEventKind {
    /// Short label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            LoanEventKind::Requested { .. } => "requested",
            LoanEventKind::Funded { .. } => "funded",
            LoanEventKind::PartiallyRepaid { .. } => "partially_repaid",
            LoanEventKind::Repaid { .. } => "repaid",
            LoanEventKind::CollateralClaimed { .. } => "collateral_claimed",
        }
    }
}
