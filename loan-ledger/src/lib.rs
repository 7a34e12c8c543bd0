//! Loan Ledger
//!
//! Collateralized lending ledger: a borrower escrows collateral and asks for
//! a loan of half its value, a lender funds it, and the loan ends either in
//! repayment with an early-repayment rebate or in the lender claiming the
//! collateral after the deadline.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor owns the loan book, so operations are linearizable
//! - **Staged Commits**: A loan record changes only after its money movement succeeded
//! - **Compensated Transfers**: Failed plans roll back the legs already applied
//! - **Event Fan-out**: Every committed transition is broadcast to subscribers
//!
//! # Invariants
//!
//! - Loan ids are unique and strictly increasing
//! - Repaid and claimed are mutually exclusive and terminal
//! - `loan_amount == floor(collateral_amount / 2)` in base units
//! - `amount_repaid` only grows, and only while funded and unresolved

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod book;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod interest;
pub mod ledger;
pub mod metrics;
pub mod transfer;
pub mod types;

// Re-exports
pub use book::LoanBook;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CollateralRelease, Config, PolicyConfig, RepaymentAuthorization};
pub use error::{Error, Result};
pub use events::{LoanEvent, LoanEventKind};
pub use interest::RepaymentQuote;
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use transfer::{InMemoryTransfer, TransferError, ValueTransfer};
pub use types::{Amount, Loan, LoanId, LoanStatus, PartyId};
