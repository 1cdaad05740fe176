//! Metrics collection and exposition.
//!
//! # Metrics
//! - `anchor_messages_submitted_total` (counter): messages staged, by type
//! - `anchor_batch_dispatch_total` (counter): dispatch attempts, by outcome
//! - `anchor_batch_dispatch_seconds` (histogram): dispatch latency
//! - `anchor_blobs_published_total` (counter): blobs copied to shared storage
//! - `anchor_batch_pins_total` (counter): pins submitted to the ledger

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::model::MessageType;

/// Metrics collaborator of the broadcast manager.
pub trait Metrics: Send + Sync {
    fn enabled(&self) -> bool;

    fn message_submitted(&self, msg_type: MessageType);

    fn batch_dispatched(&self, success: bool, elapsed: Duration);

    fn blob_published(&self);

    fn batch_pinned(&self, pins: usize);
}

/// Records through the global `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetrics;

impl Metrics for PrometheusMetrics {
    fn enabled(&self) -> bool {
        true
    }

    fn message_submitted(&self, msg_type: MessageType) {
        counter!("anchor_messages_submitted_total", "type" => msg_type.to_string()).increment(1);
    }

    fn batch_dispatched(&self, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        counter!("anchor_batch_dispatch_total", "outcome" => outcome).increment(1);
        histogram!("anchor_batch_dispatch_seconds").record(elapsed.as_secs_f64());
    }

    fn blob_published(&self) {
        counter!("anchor_blobs_published_total").increment(1);
    }

    fn batch_pinned(&self, pins: usize) {
        counter!("anchor_batch_pins_total").increment(pins as u64);
    }
}

/// Discards everything. Used when metrics are disabled.
#[derive(Debug, Clone, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn enabled(&self) -> bool {
        false
    }

    fn message_submitted(&self, _msg_type: MessageType) {}

    fn batch_dispatched(&self, _success: bool, _elapsed: Duration) {}

    fn blob_published(&self) {}

    fn batch_pinned(&self, _pins: usize) {}
}

/// Install the Prometheus exporter, serving scrapes on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_harmless() {
        let metrics = PrometheusMetrics;
        assert!(metrics.enabled());
        metrics.message_submitted(MessageType::Broadcast);
        metrics.batch_dispatched(true, Duration::from_millis(5));
        metrics.blob_published();
        metrics.batch_pinned(2);
        assert!(!NoopMetrics.enabled());
    }
}
