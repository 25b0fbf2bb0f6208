//! Prometheus metrics for consumer loops
//!
//! Provides observability into fetch, processing, and callback behavior.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Consumer loop metrics helper
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    /// Consumer name for labeling
    consumer_name: String,
}

impl PipelineMetrics {
    /// Create new PipelineMetrics
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
        }
    }

    /// Record a message being fetched
    pub fn message_fetched(&self) {
        counter!(
            "pipeline_messages_fetched_total",
            "consumer" => self.consumer_name.clone()
        )
        .increment(1);
    }

    /// Record a fetch that found nothing available
    pub fn fetch_empty(&self) {
        counter!(
            "pipeline_fetch_empty_total",
            "consumer" => self.consumer_name.clone()
        )
        .increment(1);
    }

    /// Record a fetch failure
    pub fn fetch_error(&self) {
        counter!(
            "pipeline_fetch_errors_total",
            "consumer" => self.consumer_name.clone()
        )
        .increment(1);
    }

    /// Record a message processed successfully
    pub fn message_processed(&self, duration: Duration) {
        counter!(
            "pipeline_messages_processed_total",
            "consumer" => self.consumer_name.clone(),
            "outcome" => "completed"
        )
        .increment(1);

        histogram!(
            "pipeline_processing_duration_seconds",
            "consumer" => self.consumer_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a message failing
    pub fn message_failed(&self, category: &str) {
        counter!(
            "pipeline_messages_processed_total",
            "consumer" => self.consumer_name.clone(),
            "outcome" => "failed"
        )
        .increment(1);

        counter!(
            "pipeline_processing_errors_total",
            "consumer" => self.consumer_name.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    /// Record a message abandoned by cancellation
    pub fn message_cancelled(&self) {
        counter!(
            "pipeline_messages_processed_total",
            "consumer" => self.consumer_name.clone(),
            "outcome" => "cancelled"
        )
        .increment(1);
    }

    /// Record a visibility keep-alive renewal
    pub fn keepalive_renewal(&self) {
        counter!(
            "pipeline_keepalive_renewals_total",
            "consumer" => self.consumer_name.clone()
        )
        .increment(1);
    }

    /// Record a completion/failure callback failing
    pub fn callback_error(&self, callback: &'static str) {
        counter!(
            "pipeline_callback_errors_total",
            "consumer" => self.consumer_name.clone(),
            "callback" => callback
        )
        .increment(1);
    }

    /// Record a loop state transition
    pub fn state_transition(&self, state: &str) {
        counter!(
            "pipeline_state_transitions_total",
            "consumer" => self.consumer_name.clone(),
            "state" => state.to_string()
        )
        .increment(1);
    }

    /// Update the in-flight message gauge
    pub fn in_flight(&self, count: i64) {
        gauge!(
            "pipeline_messages_in_flight",
            "consumer" => self.consumer_name.clone()
        )
        .set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PipelineMetrics::new("test-consumer");
        assert_eq!(metrics.consumer_name, "test-consumer");
    }

    #[test]
    fn test_render_without_init_is_empty() {
        // The recorder may or may not be installed depending on test order;
        // rendering must never panic either way.
        let _ = render_metrics();
    }
}
