use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

use crate::errors::WalletError;

lazy_static! {
    pub static ref WALLETS_CREATED: IntCounter = register_int_counter!(
        "wallet_engine_wallets_created_total",
        "Total wallets created"
    )
    .expect("metric can be created");

    /// Transaction requests by outcome (`committed` or an error type)
    pub static ref TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wallet_engine_transactions_total",
        "Total transaction requests by outcome",
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "wallet_engine_operation_duration_seconds",
        "Ledger operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("metric can be created");
}

pub fn record_transaction_outcome<T>(result: &Result<T, WalletError>) {
    let outcome = match result {
        Ok(_) => "committed",
        Err(e) => e.error_type(),
    };
    TRANSACTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
