//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a dispatched viewset action
pub fn record_request(resource: &str, action: &str) {
    metrics::counter!("snippets_api_requests_total",
        "resource" => resource.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// Record snippet creation
pub fn record_snippet_created(language: &str) {
    metrics::counter!("snippets_api_snippets_created_total",
        "language" => language.to_string()
    )
    .increment(1);
}

/// Record snippet deletion
pub fn record_snippet_deleted() {
    metrics::counter!("snippets_api_snippets_deleted_total").increment(1);
}

/// Record a login attempt
pub fn record_login(success: bool) {
    metrics::counter!("snippets_api_logins_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Update total snippet count gauge
pub fn update_snippet_count(count: usize) {
    metrics::gauge!("snippets_api_snippets_count").set(count as f64);
}
