//! Prometheus metrics for the observatory.

use metrics::{counter, histogram};

/// Install the Prometheus exporter (serves `/metrics` on its own listener).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a webhook received event.
pub fn webhook_received(event_type: &str) {
    counter!("orchon_webhooks_received_total", "event" => event_type.to_string()).increment(1);
}

/// Record a deployment status written by the tracker.
pub fn deployment_status_changed(status: &str) {
    counter!("orchon_deployments_total", "status" => status.to_string()).increment(1);
}

pub fn deployment_persist_failed() {
    counter!("orchon_deployment_persist_failures_total").increment(1);
}

/// Record a discovery source failure.
pub fn discovery_error(source: &str) {
    counter!("orchon_discovery_errors_total", "source" => source.to_string()).increment(1);
}

/// Record a project scan's duration.
pub fn scan_duration(duration_ms: u64) {
    histogram!("orchon_scan_duration_ms").record(duration_ms as f64);
}

/// Record an upstream API call that failed (github, npm, doh).
pub fn upstream_error(upstream: &str) {
    counter!("orchon_upstream_errors_total", "upstream" => upstream.to_string()).increment(1);
}
