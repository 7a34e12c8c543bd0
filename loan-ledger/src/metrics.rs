//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the loan ledger.
//!
//! # Metrics
//!
//! - `loan_ledger_operations_total{operation,outcome}` - Operations by result
//! - `loan_ledger_operation_duration_seconds{operation}` - Operation latency
//! - `loan_ledger_open_loans` - Loans neither repaid nor claimed
//! - `loan_ledger_escrowed_collateral` - Collateral held in escrow (whole units)

use crate::types::Amount;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Metrics collector
///
/// Each collector owns its registry, so several ledgers can live in one
/// process.
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome
    pub operations_total: IntCounterVec,

    /// Operation latency histogram
    pub operation_duration: HistogramVec,

    /// Open loans
    pub open_loans: IntGauge,

    /// Escrowed collateral in whole units
    pub escrowed_collateral: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("open_loans", &self.open_loans.get())
            .field("escrowed_collateral", &self.escrowed_collateral.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new(
                "loan_ledger_operations_total",
                "Loan operations by name and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "loan_ledger_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let open_loans = IntGauge::new("loan_ledger_open_loans", "Loans neither repaid nor claimed")?;
        registry.register(Box::new(open_loans.clone()))?;

        let escrowed_collateral = Gauge::new(
            "loan_ledger_escrowed_collateral",
            "Collateral held in escrow, whole units",
        )?;
        registry.register(Box::new(escrowed_collateral.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            open_loans,
            escrowed_collateral,
            registry,
        })
    }

    /// Record one operation
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_seconds: f64) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_seconds);
    }

    /// Update book-level gauges
    pub fn update_book(&self, open_loans: usize, escrowed: Amount) {
        self.open_loans
            .set(i64::try_from(open_loans).unwrap_or(i64::MAX));

        let whole_units = escrowed
            .to_decimal()
            .and_then(|d| d.to_f64())
            .unwrap_or(escrowed.base_units() as f64 / Amount::ONE.base_units() as f64);
        self.escrowed_collateral.set(whole_units);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.open_loans.get(), 0);
        assert_eq!(metrics.escrowed_collateral.get(), 0.0);
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors must not clash on registration
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_operation("fund_loan", "ok", 0.001);
        assert_eq!(
            a.operations_total.with_label_values(&["fund_loan", "ok"]).get(),
            1
        );
        assert_eq!(
            b.operations_total.with_label_values(&["fund_loan", "ok"]).get(),
            0
        );
    }

    #[test]
    fn test_record_operation_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_operation("repay_loan", "ok", 0.0002);
        metrics.record_operation("repay_loan", "insufficient_payment", 0.0001);
        metrics.record_operation("repay_loan", "insufficient_payment", 0.0001);

        let rejected = metrics
            .operations_total
            .with_label_values(&["repay_loan", "insufficient_payment"])
            .get();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_update_book() {
        let metrics = Metrics::new().unwrap();
        metrics.update_book(3, "1.5".parse().unwrap());
        assert_eq!(metrics.open_loans.get(), 3);
        assert_eq!(metrics.escrowed_collateral.get(), 1.5);
    }

    #[test]
    fn test_gathered_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_operation("request_loan", "ok", 0.001);
        let names: Vec<_> = metrics
            .registry()
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"loan_ledger_operations_total".to_string()));
        assert!(names.contains(&"loan_ledger_open_loans".to_string()));
    }
}
