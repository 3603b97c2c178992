//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submissions accepted and rejected (by failing stage)
//! - Dispatched transactions and receipt outcomes
//! - Confirmation latency
//! - RPC retries and exhausted retry budgets

use crate::error::SubmitStage;

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Encoder,
    Histogram, IntCounter, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Submission metrics
    pub static ref SUBMISSIONS_ACCEPTED: IntCounter = register_int_counter!(
        "tx_pipeline_submissions_accepted_total",
        "Total submissions accepted onto the sequencer queue"
    ).unwrap();

    pub static ref SUBMISSIONS_REJECTED: CounterVec = register_counter_vec!(
        "tx_pipeline_submissions_rejected_total",
        "Total submissions rejected before dispatch, by failing stage",
        &["stage"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_DISPATCHED: IntCounter = register_int_counter!(
        "tx_pipeline_transactions_dispatched_total",
        "Total transactions sent to the node"
    ).unwrap();

    pub static ref TX_RECEIPTS: CounterVec = register_counter_vec!(
        "tx_pipeline_receipts_total",
        "Total receipts obtained, by execution status",
        &["status"]
    ).unwrap();

    pub static ref TX_CONFIRMATION_LATENCY: Histogram = register_histogram!(
        "tx_pipeline_confirmation_latency_seconds",
        "Time from acceptance to receipt",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref WATCHER_FAILURES: IntCounter = register_int_counter!(
        "tx_pipeline_watcher_failures_total",
        "Times the confirmation watcher stopped on a receipt-wait failure"
    ).unwrap();

    // Transport metrics
    pub static ref RPC_RETRIES: CounterVec = register_counter_vec!(
        "tx_pipeline_rpc_retries_total",
        "Total retried RPC attempts",
        &["method"]
    ).unwrap();

    pub static ref RPC_EXHAUSTED: CounterVec = register_counter_vec!(
        "tx_pipeline_rpc_retries_exhausted_total",
        "Total RPC calls that ran out of retry attempts",
        &["method"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {}", addr))?;
        axum::serve(listener, app)
            .await
            .context("metrics server stopped")?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_submission_accepted() {
    SUBMISSIONS_ACCEPTED.inc();
}

pub fn record_submission_rejected(stage: SubmitStage) {
    SUBMISSIONS_REJECTED
        .with_label_values(&[stage.as_str()])
        .inc();
}

pub fn record_tx_dispatched() {
    TX_DISPATCHED.inc();
}

pub fn record_receipt(succeeded: bool) {
    let status = if succeeded { "success" } else { "failed" };
    TX_RECEIPTS.with_label_values(&[status]).inc();
}

pub fn record_confirmation_latency(latency_secs: f64) {
    TX_CONFIRMATION_LATENCY.observe(latency_secs);
}

pub fn record_watcher_failure() {
    WATCHER_FAILURES.inc();
}

pub fn record_rpc_retry(method: &str) {
    RPC_RETRIES.with_label_values(&[method]).inc();
}

pub fn record_rpc_exhausted(method: &str) {
    RPC_EXHAUSTED.with_label_values(&[method]).inc();
}
