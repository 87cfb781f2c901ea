//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gridfs_requests_total` (counter): requests by location, status
//! - `gridfs_request_duration_seconds` (histogram): time to the response head
//! - `gridfs_chunks_streamed_total` (counter): chunks written to clients
//! - `gridfs_bytes_streamed_total` (counter): payload bytes written to clients
//! - `gridfs_reconnects_total` (counter): reconnect attempts by group, outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Label used when no location matched.
pub const NO_LOCATION: &str = "none";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(location: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gridfs_requests_total",
        "location" => location.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gridfs_request_duration_seconds",
        "location" => location.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_stream(location: &str, chunks: u64, bytes: u64) {
    metrics::counter!("gridfs_chunks_streamed_total", "location" => location.to_string())
        .increment(chunks);
    metrics::counter!("gridfs_bytes_streamed_total", "location" => location.to_string())
        .increment(bytes);
}

pub fn record_reconnect(group: &str, outcome: &'static str) {
    metrics::counter!(
        "gridfs_reconnects_total",
        "group" => group.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
