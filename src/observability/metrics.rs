//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_csrf_rejections_total` (counter): rejected tokens by reason
//! - `shield_rate_limited_total` (counter): requests refused with 429
//! - `shield_rate_limit_store_errors_total` (counter): durable store failures by operation
//! - `shield_cors_reloads_total` (counter): allow-list reloads by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter is optional (observability.metrics_enabled)

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_csrf_rejection(reason: &'static str) {
    metrics::counter!("shield_csrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("shield_rate_limited_total").increment(1);
}

pub fn record_store_error(operation: &'static str) {
    metrics::counter!("shield_rate_limit_store_errors_total", "operation" => operation).increment(1);
}

pub fn record_origin_reload(outcome: &'static str) {
    metrics::counter!("shield_cors_reloads_total", "outcome" => outcome).increment(1);
}
