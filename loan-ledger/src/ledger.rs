//! Main ledger orchestration layer
//!
//! This module ties together the loan book, the actor, metrics and event
//! fan-out into a high-level API for the loan lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use loan_ledger::{Amount, Config, InMemoryTransfer, Ledger, PartyId, SystemClock};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> loan_ledger::Result<()> {
//!     let transfer = Arc::new(InMemoryTransfer::new());
//!     let ledger = Ledger::open(Config::default(), Arc::new(SystemClock), transfer).await?;
//!
//!     let borrower = PartyId::new("borrower");
//!     let collateral: Amount = "1".parse()?;
//!     let loan_id = ledger.request_loan(&borrower, 10, 604_800, collateral).await?;
//!     println!("requested loan {}", loan_id);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    book::LoanBook,
    clock::Clock,
    events::LoanEvent,
    interest::RepaymentQuote,
    metrics::Metrics,
    transfer::ValueTransfer,
    types::{Amount, Loan, LoanId, PartyId},
    Config, Result,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for all operations
    handle: LedgerHandle,

    /// Event fan-out (kept to hand out receivers)
    events: broadcast::Sender<LoanEvent>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration and collaborators
    pub async fn open(
        config: Config,
        clock: Arc<dyn Clock>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()?;
        let (events, _) = broadcast::channel(config.actor.event_channel_capacity);
        let book = LoanBook::new(config.policy, clock, transfer);

        let handle = spawn_ledger_actor(
            book,
            events.clone(),
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            policy = ?config.policy,
            "Loan ledger opened"
        );

        Ok(Self {
            handle,
            events,
            metrics,
            config,
        })
    }

    /// Cloneable handle for concurrent callers
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Receive every event committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LoanEvent> {
        self.events.subscribe()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Escrow collateral and request a loan of half its value
    pub async fn request_loan(
        &self,
        borrower: &PartyId,
        interest_rate: u32,
        duration_secs: u64,
        collateral: Amount,
    ) -> Result<LoanId> {
        self.handle
            .request_loan(borrower, interest_rate, duration_secs, collateral)
            .await
    }

    /// Fund a requested loan with exactly its loan amount
    pub async fn fund_loan(&self, loan_id: LoanId, lender: &PartyId, amount: Amount) -> Result<()> {
        self.handle.fund_loan(loan_id, lender, amount).await
    }

    /// Pay part of a funded loan
    pub async fn partial_repayment(
        &self,
        loan_id: LoanId,
        payer: &PartyId,
        amount: Amount,
    ) -> Result<()> {
        self.handle.partial_repayment(loan_id, payer, amount).await
    }

    /// Settle a funded loan
    pub async fn repay_loan(&self, loan_id: LoanId, payer: &PartyId, amount: Amount) -> Result<()> {
        self.handle.repay_loan(loan_id, payer, amount).await
    }

    /// Claim collateral once the deadline has passed
    pub async fn claim_collateral(&self, loan_id: LoanId, caller: &PartyId) -> Result<()> {
        self.handle.claim_collateral(loan_id, caller).await
    }

    /// Committed loan snapshot
    pub async fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.handle.get_loan(loan_id).await
    }

    /// All loans ordered by id
    pub async fn loans(&self) -> Result<Vec<Loan>> {
        self.handle.loans().await
    }

    /// What a final repayment would cost right now
    pub async fn repayment_quote(&self, loan_id: LoanId) -> Result<RepaymentQuote> {
        self.handle.repayment_quote(loan_id).await
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
