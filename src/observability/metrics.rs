//! Metrics collection and exposition.
//!
//! # Metrics
//! - `flow_attempts_total` (counter): upstream attempts by outcome
//! - `flow_attempt_duration_seconds` (histogram): attempt latency
//! - `flow_retries_total` (counter): scheduled retries
//! - `flow_circuit_rejections_total` (counter): calls rejected by an open circuit
//! - `flow_circuit_transitions_total` (counter): breaker transitions by target state
//! - `flow_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `flow_items_processed_total` (counter): items handed to paced consumers
//! - `flow_batches_total` (counter): batches requested by paced consumers
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(outcome: &'static str, elapsed: Duration) {
    counter!("flow_attempts_total", "outcome" => outcome).increment(1);
    histogram!("flow_attempt_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_retry() {
    counter!("flow_retries_total").increment(1);
}

pub fn record_rejection(breaker: &str) {
    counter!("flow_circuit_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_circuit_transition(breaker: &str, to: CircuitState) {
    counter!(
        "flow_circuit_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
    gauge!("flow_circuit_state", "breaker" => breaker.to_string()).set(f64::from(to as u8));
}

pub fn record_item_processed() {
    counter!("flow_items_processed_total").increment(1);
}

pub fn record_batch_requested(size: u64) {
    counter!("flow_batches_total").increment(1);
    histogram!("flow_batch_size").record(size as f64);
}
