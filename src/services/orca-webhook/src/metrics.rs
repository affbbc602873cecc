//! Prometheus metrics for the webhook relay

use crate::error::{OrcaError, OrcaResult};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE: &str = "orca_relay";

/// Metrics collector shared by the receiver and sender
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Arc<Registry>,
    webhooks_received: IntCounterVec,
    decode_failures: IntCounter,
    handler_failures: IntCounterVec,
    outbound_sends: IntCounterVec,
    outbound_duration: HistogramVec,
}

impl RelayMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> OrcaResult<Self> {
        let registry = Registry::new();

        let webhooks_received = IntCounterVec::new(
            Opts::new(
                "webhooks_received_total",
                "Decoded inbound webhooks by action",
            )
            .namespace(NAMESPACE),
            &["action"],
        )
        .map_err(|e| metric_error("webhooks_received_total", e))?;

        let decode_failures = IntCounter::with_opts(
            Opts::new(
                "decode_failures_total",
                "Inbound bodies that failed to decode",
            )
            .namespace(NAMESPACE),
        )
        .map_err(|e| metric_error("decode_failures_total", e))?;

        let handler_failures = IntCounterVec::new(
            Opts::new(
                "handler_failures_total",
                "Action handler invocations that returned an error",
            )
            .namespace(NAMESPACE),
            &["action"],
        )
        .map_err(|e| metric_error("handler_failures_total", e))?;

        let outbound_sends = IntCounterVec::new(
            Opts::new("outbound_sends_total", "Outbound row events by outcome")
                .namespace(NAMESPACE),
            &["action", "outcome"],
        )
        .map_err(|e| metric_error("outbound_sends_total", e))?;

        let outbound_duration = HistogramVec::new(
            HistogramOpts::new(
                "outbound_duration_seconds",
                "Time taken by outbound row event requests",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )
        .map_err(|e| metric_error("outbound_duration_seconds", e))?;

        registry
            .register(Box::new(webhooks_received.clone()))
            .map_err(|e| metric_error("webhooks_received_total", e))?;
        registry
            .register(Box::new(decode_failures.clone()))
            .map_err(|e| metric_error("decode_failures_total", e))?;
        registry
            .register(Box::new(handler_failures.clone()))
            .map_err(|e| metric_error("handler_failures_total", e))?;
        registry
            .register(Box::new(outbound_sends.clone()))
            .map_err(|e| metric_error("outbound_sends_total", e))?;
        registry
            .register(Box::new(outbound_duration.clone()))
            .map_err(|e| metric_error("outbound_duration_seconds", e))?;

        Ok(Self {
            registry: Arc::new(registry),
            webhooks_received,
            decode_failures,
            handler_failures,
            outbound_sends,
            outbound_duration,
        })
    }

    /// Count a decoded webhook; `action` is the dispatch label
    pub fn record_received(&self, action: &str) {
        self.webhooks_received.with_label_values(&[action]).inc();
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.inc();
    }

    pub fn record_handler_failure(&self, action: &str) {
        self.handler_failures.with_label_values(&[action]).inc();
    }

    /// Count an outbound send and its duration
    pub fn record_send(&self, action: &str, outcome: &str, elapsed: Duration) {
        self.outbound_sends
            .with_label_values(&[action, outcome])
            .inc();
        self.outbound_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    pub fn received_count(&self, action: &str) -> u64 {
        self.webhooks_received.with_label_values(&[action]).get()
    }

    pub fn decode_failure_count(&self) -> u64 {
        self.decode_failures.get()
    }

    pub fn handler_failure_count(&self, action: &str) -> u64 {
        self.handler_failures.with_label_values(&[action]).get()
    }

    pub fn send_count(&self, action: &str, outcome: &str) -> u64 {
        self.outbound_sends
            .with_label_values(&[action, outcome])
            .get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> OrcaResult<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| OrcaError::internal(format!("Failed to encode metrics: {}", e)))
    }
}

fn metric_error(name: &str, e: prometheus::Error) -> OrcaError {
    OrcaError::internal(format!("Failed to set up metric {}: {}", name, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = RelayMetrics::new().unwrap();

        metrics.record_received("add");
        metrics.record_received("add");
        metrics.record_received("ignored");
        metrics.record_decode_failure();
        metrics.record_handler_failure("delete");

        assert_eq!(metrics.received_count("add"), 2);
        assert_eq!(metrics.received_count("ignored"), 1);
        assert_eq!(metrics.received_count("update"), 0);
        assert_eq!(metrics.decode_failure_count(), 1);
        assert_eq!(metrics.handler_failure_count("delete"), 1);
    }

    #[test]
    fn test_export_contains_recorded_series() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.record_received("test");
        metrics.record_send("add", "delivered", Duration::from_millis(20));

        let text = metrics.export().unwrap();
        assert!(text.contains("orca_relay_webhooks_received_total{action=\"test\"} 1"));
        assert!(text.contains("orca_relay_outbound_sends_total"));
        assert!(text.contains("orca_relay_outbound_duration_seconds_bucket"));
        assert_eq!(metrics.send_count("add", "delivered"), 1);
    }

    #[test]
    fn test_independent_registries() {
        let first = RelayMetrics::new().unwrap();
        let second = RelayMetrics::new().unwrap();
        first.record_decode_failure();
        assert_eq!(second.decode_failure_count(), 0);
    }
}
