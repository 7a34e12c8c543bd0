//! Actor-based concurrency for the loan ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the [`LoanBook`], so no two operations ever interleave
//! - Check, transfer and commit of an operation run as one message
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LoanActor (Single Task)                  │
//! │  LoanBook: validate → TransferPlan → commit           │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ broadcast::channel
//!                       ▼
//!                 LoanEvent subscribers
//! ```

use crate::{
    book::LoanBook,
    events::LoanEvent,
    interest::RepaymentQuote,
    metrics::Metrics,
    types::{Amount, Loan, LoanId, PartyId},
    Error, Result,
};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Escrow collateral and request a loan
    RequestLoan {
        borrower: PartyId,
        interest_rate: u32,
        duration_secs: u64,
        collateral: Amount,
        response: oneshot::Sender<Result<LoanId>>,
    },

    /// Fund a requested loan
    FundLoan {
        loan_id: LoanId,
        lender: PartyId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Pay part of a funded loan
    PartialRepayment {
        loan_id: LoanId,
        payer: PartyId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Settle a funded loan
    RepayLoan {
        loan_id: LoanId,
        payer: PartyId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Claim collateral after the deadline
    ClaimCollateral {
        loan_id: LoanId,
        caller: PartyId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Get loan snapshot
    GetLoan {
        loan_id: LoanId,
        response: oneshot::Sender<Result<Loan>>,
    },

    /// List all loans
    ListLoans {
        response: oneshot::Sender<Vec<Loan>>,
    },

    /// Quote final repayment
    RepaymentQuote {
        loan_id: LoanId,
        response: oneshot::Sender<Result<RepaymentQuote>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LoanActor {
    /// Loan state machine, owned exclusively by this task
    book: LoanBook,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Committed event fan-out
    events: broadcast::Sender<LoanEvent>,

    /// Metrics
    metrics: Metrics,
}

impl LoanActor {
    /// Create new actor
    pub fn new(
        book: LoanBook,
        mailbox: mpsc::Receiver<LedgerMessage>,
        events: broadcast::Sender<LoanEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            book,
            mailbox,
            events,
            metrics,
        }
    }

    /// Run the actor event loop until shutdown or all handles are dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!(loans = self.book.len(), "Loan actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::RequestLoan {
                borrower,
                interest_rate,
                duration_secs,
                collateral,
                response,
            } => {
                let result = self.apply("request_loan", |book| {
                    book.request_loan(&borrower, interest_rate, duration_secs, collateral)
                });
                let _ = response.send(result.map(|event| event.loan_id));
            }

            LedgerMessage::FundLoan {
                loan_id,
                lender,
                amount,
                response,
            } => {
                let result = self.apply("fund_loan", |book| book.fund_loan(loan_id, &lender, amount));
                let _ = response.send(result.map(|_| ()));
            }

            LedgerMessage::PartialRepayment {
                loan_id,
                payer,
                amount,
                response,
            } => {
                let result = self.apply("partial_repayment", |book| {
                    book.partial_repayment(loan_id, &payer, amount)
                });
                let _ = response.send(result.map(|_| ()));
            }

            LedgerMessage::RepayLoan {
                loan_id,
                payer,
                amount,
                response,
            } => {
                let result = self.apply("repay_loan", |book| book.repay_loan(loan_id, &payer, amount));
                let _ = response.send(result.map(|_| ()));
            }

            LedgerMessage::ClaimCollateral {
                loan_id,
                caller,
                response,
            } => {
                let result = self.apply("claim_collateral", |book| {
                    book.claim_collateral(loan_id, &caller)
                });
                let _ = response.send(result.map(|_| ()));
            }

            LedgerMessage::GetLoan { loan_id, response } => {
                let _ = response.send(self.book.get_loan(loan_id));
            }

            LedgerMessage::ListLoans { response } => {
                let _ = response.send(self.book.loans());
            }

            LedgerMessage::RepaymentQuote { loan_id, response } => {
                let _ = response.send(self.book.repayment_quote(loan_id));
            }

            LedgerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }

    /// Run a mutating operation, then record and publish its outcome
    fn apply(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut LoanBook) -> Result<LoanEvent>,
    ) -> Result<LoanEvent> {
        let started = Instant::now();
        let result = op(&mut self.book);

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        self.metrics
            .record_operation(operation, outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(event) => {
                self.metrics
                    .update_book(self.book.open_loans(), self.book.escrowed_collateral());
                // No subscribers is not an error
                let _ = self.events.send(event.clone());
            }
            Err(err) => {
                tracing::warn!(operation, error = %err, "Loan operation rejected");
            }
        }

        result
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Request a loan
    pub async fn request_loan(
        &self,
        borrower: &PartyId,
        interest_rate: u32,
        duration_secs: u64,
        collateral: Amount,
    ) -> Result<LoanId> {
        self.call(|response| LedgerMessage::RequestLoan {
            borrower: borrower.clone(),
            interest_rate,
            duration_secs,
            collateral,
            response,
        })
        .await?
    }

    /// Fund a loan
    pub async fn fund_loan(&self, loan_id: LoanId, lender: &PartyId, amount: Amount) -> Result<()> {
        self.call(|response| LedgerMessage::FundLoan {
            loan_id,
            lender: lender.clone(),
            amount,
            response,
        })
        .await?
    }

    /// Partial repayment
    pub async fn partial_repayment(
        &self,
        loan_id: LoanId,
        payer: &PartyId,
        amount: Amount,
    ) -> Result<()> {
        self.call(|response| LedgerMessage::PartialRepayment {
            loan_id,
            payer: payer.clone(),
            amount,
            response,
        })
        .await?
    }

    /// Final repayment
    pub async fn repay_loan(&self, loan_id: LoanId, payer: &PartyId, amount: Amount) -> Result<()> {
        self.call(|response| LedgerMessage::RepayLoan {
            loan_id,
            payer: payer.clone(),
            amount,
            response,
        })
        .await?
    }

    /// Claim collateral
    pub async fn claim_collateral(&self, loan_id: LoanId, caller: &PartyId) -> Result<()> {
        self.call(|response| LedgerMessage::ClaimCollateral {
            loan_id,
            caller: caller.clone(),
            response,
        })
        .await?
    }

    /// Get loan snapshot
    pub async fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.call(|response| LedgerMessage::GetLoan { loan_id, response })
            .await?
    }

    /// List all loans
    pub async fn loans(&self) -> Result<Vec<Loan>> {
        self.call(|response| LedgerMessage::ListLoans { response }).await
    }

    /// Quote final repayment
    pub async fn repayment_quote(&self, loan_id: LoanId) -> Result<RepaymentQuote> {
        self.call(|response| LedgerMessage::RepaymentQuote { loan_id, response })
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    book: LoanBook,
    events: broadcast::Sender<LoanEvent>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LoanActor::new(book, rx, events, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PolicyConfig;
    use crate::transfer::InMemoryTransfer;
    use std::sync::Arc;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn spawn_test_actor() -> (LedgerHandle, Arc<InMemoryTransfer>, Metrics, broadcast::Receiver<LoanEvent>) {
        let transfer = Arc::new(InMemoryTransfer::new());
        let book = LoanBook::new(
            PolicyConfig::default(),
            Arc::new(ManualClock::default()),
            transfer.clone(),
        );
        let (events, rx) = broadcast::channel(16);
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(book, events, metrics.clone(), 8);
        (handle, transfer, metrics, rx)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _, _, _) = spawn_test_actor();

        handle.shutdown().await.unwrap();

        // Queued behind the shutdown, so it is never answered
        let result = handle.loans().await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }

    #[tokio::test]
    async fn test_actor_request_publishes_event() {
        let (handle, transfer, metrics, mut events) = spawn_test_actor();
        let borrower = PartyId::new("borrower");
        transfer.deposit(&borrower, amount("2")).unwrap();

        let id = handle
            .request_loan(&borrower, 5, 3600, amount("2"))
            .await
            .unwrap();
        assert_eq!(id, LoanId::FIRST);

        let event = events.recv().await.unwrap();
        assert_eq!(event.loan_id, id);
        assert_eq!(event.kind.name(), "requested");

        assert_eq!(metrics.open_loans.get(), 1);
        assert_eq!(metrics.escrowed_collateral.get(), 2.0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejection_recorded_not_published() {
        let (handle, _, metrics, mut events) = spawn_test_actor();
        let lender = PartyId::new("lender");

        let result = handle.fund_loan(LoanId::new(9), &lender, amount("1")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["fund_loan", "not_found"])
                .get(),
            1
        );
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_funding_single_winner() {
        let (handle, transfer, _, _) = spawn_test_actor();
        let borrower = PartyId::new("borrower");
        transfer.deposit(&borrower, amount("1")).unwrap();
        let id = handle
            .request_loan(&borrower, 10, 3600, amount("1"))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let handle = handle.clone();
            let lender = PartyId::new(format!("lender-{}", i));
            transfer.deposit(&lender, amount("1")).unwrap();
            tasks.push(tokio::spawn(async move {
                handle.fund_loan(id, &lender, amount("0.5")).await
            }));
        }

        let mut funded = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => funded += 1,
                Err(Error::AlreadyFunded(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(funded, 1);
        assert_eq!(rejected, 7);

        // Exactly one lender paid
        assert_eq!(transfer.balance(&borrower), amount("0.5"));

        handle.shutdown().await.unwrap();
    }
}
