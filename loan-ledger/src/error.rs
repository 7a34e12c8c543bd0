//! Error types for the loan ledger

use crate::transfer::TransferError;
use crate::types::{Amount, LoanId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loan ledger errors
///
/// Every variant is scoped to a single operation on a single loan; none of
/// them is retried by the ledger.
#[derive(Error, Debug)]
pub enum Error {
    /// Loan id unknown to this ledger
    #[error("Loan not found: {0}")]
    NotFound(LoanId),

    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Loan already has a lender
    #[error("Loan {0} is already funded")]
    AlreadyFunded(LoanId),

    /// Funding amount differs from the loan amount
    #[error("Funding amount mismatch: expected {expected}, got {offered}")]
    AmountMismatch {
        /// Stored loan amount
        expected: Amount,
        /// Amount offered by the caller
        offered: Amount,
    },

    /// Operation requires a funded loan
    #[error("Loan {0} is not funded")]
    NotFunded(LoanId),

    /// Loan is repaid or its collateral was claimed
    #[error("Loan {0} is already resolved")]
    AlreadyResolved(LoanId),

    /// Final payment below the required amount
    #[error("Insufficient payment: required {required}, got {offered}")]
    InsufficientPayment {
        /// Required final payment
        required: Amount,
        /// Amount offered by the caller
        offered: Amount,
    },

    /// Caller is not the recorded lender
    #[error("Caller is not the lender of loan {0}")]
    NotLender(LoanId),

    /// Caller is not the recorded borrower
    #[error("Caller is not the borrower of loan {0}")]
    NotBorrower(LoanId),

    /// Repayment deadline has not elapsed yet
    #[error("Deadline for loan {loan_id} not reached (deadline {deadline:?})")]
    DeadlineNotReached {
        /// Loan id
        loan_id: LoanId,
        /// Deadline, `None` when it lies beyond the representable range
        deadline: Option<DateTime<Utc>>,
    },

    /// Arithmetic overflow on base units
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Value transfer failed (state was not committed)
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Compensation of an applied transfer leg failed
    #[error("Transfer rollback failed: {0}")]
    RollbackFailed(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AlreadyFunded(_) => "already_funded",
            Error::AmountMismatch { .. } => "amount_mismatch",
            Error::NotFunded(_) => "not_funded",
            Error::AlreadyResolved(_) => "already_resolved",
            Error::InsufficientPayment { .. } => "insufficient_payment",
            Error::NotLender(_) => "not_lender",
            Error::NotBorrower(_) => "not_borrower",
            Error::DeadlineNotReached { .. } => "deadline_not_reached",
            Error::Overflow(_) => "overflow",
            Error::Transfer(_) => "transfer",
            Error::RollbackFailed(_) => "rollback_failed",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}
