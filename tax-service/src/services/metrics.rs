//! Prometheus metrics for tax-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Reports generated by period type and outcome (computed, cached, error).
pub static REPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_reports_total",
        "Total number of tax report requests",
        &["period_type", "outcome"]
    )
    .expect("Failed to register reports_total")
});

pub static REPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tax_report_duration_seconds",
        "Tax report computation duration in seconds",
        &["period_type"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register report_duration")
});

/// Fiscal records by initial status.
pub static FISCAL_RECORDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_fiscal_records_total",
        "Total number of fiscal records created",
        &["status"]
    )
    .expect("Failed to register fiscal_records_total")
});

/// Transmission attempts by outcome.
pub static TRANSMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_transmissions_total",
        "Total number of fiscal transmission attempts",
        &["outcome"]
    )
    .expect("Failed to register transmissions_total")
});

pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_alerts_total",
        "Total number of alerts raised",
        &["kind"]
    )
    .expect("Failed to register alerts_total")
});

/// Sweep subjects by outcome (ok, error).
pub static SWEEP_SUBJECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_sweep_subjects_total",
        "Total number of subjects processed by the monthly sweep",
        &["outcome"]
    )
    .expect("Failed to register sweep_subjects_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tax_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&REPORTS_TOTAL);
    Lazy::force(&REPORT_DURATION);
    Lazy::force(&FISCAL_RECORDS_TOTAL);
    Lazy::force(&TRANSMISSIONS_TOTAL);
    Lazy::force(&ALERTS_TOTAL);
    Lazy::force(&SWEEP_SUBJECTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

pub fn record_alert(kind: &str) {
    ALERTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_report(period_type: &str, outcome: &str) {
    REPORTS_TOTAL.with_label_values(&[period_type, outcome]).inc();
}

pub fn record_transmission(outcome: &str) {
    TRANSMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
