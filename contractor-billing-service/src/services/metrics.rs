//! Metrics module for contractor-billing-service.
//! Provides Prometheus metrics for reconciliation runs and ledger adjustments.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Reconciliation runs by operation (edit/reverse) and outcome
pub static RECONCILIATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Ledger adjustments by ledger (job_ops/work_done) and action
pub static LEDGER_ADJUSTMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    RECONCILIATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_reconciliations_total",
                "Total reconciliation runs by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register RECONCILIATIONS_TOTAL")
    });

    LEDGER_ADJUSTMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_ledger_adjustments_total",
                "Total ledger adjustments by ledger and action"
            ),
            &["ledger", "action"]
        )
        .expect("Failed to register LEDGER_ADJUSTMENTS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a reconciliation run.
pub fn record_reconciliation(operation: &str, outcome: &str) {
    if let Some(counter) = RECONCILIATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record a ledger adjustment.
pub fn record_ledger_adjustment(ledger: &str, action: &str) {
    if let Some(counter) = LEDGER_ADJUSTMENTS_TOTAL.get() {
        counter.with_label_values(&[ledger, action]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
