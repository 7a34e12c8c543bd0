//! Loan ledger node binary
//!
//! Usage: `loan-ledger-node [config.toml]`. Without a path the configuration
//! comes from `LOAN_LEDGER_*` environment variables.

use anyhow::Context;
use loan_ledger::{config::LogFormat, Config, InMemoryTransfer, Ledger, SystemClock};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env().context("Invalid LOAN_LEDGER_* environment")?,
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!("Starting loan ledger node");

    // Open ledger
    let transfer = Arc::new(InMemoryTransfer::new());
    let ledger = Ledger::open(config, Arc::new(SystemClock), transfer).await?;
    tracing::info!("Ledger opened successfully");

    let mut events = ledger.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event_id = %event.event_id,
                    loan_id = %event.loan_id,
                    kind = event.kind.name(),
                    status = %event.status_after(),
                    "Loan event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down loan ledger node");

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&ledger.metrics().registry().gather(), &mut buffer)?;
    tracing::debug!(metrics = %String::from_utf8_lossy(&buffer), "Final metrics");

    ledger.shutdown().await?;
    event_log.abort();
    Ok(())
}
