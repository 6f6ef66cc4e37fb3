use crate::error::{Result, ThrottleError};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ThrottleError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// A service whose recorder is not installed globally; renders nothing
    /// recorded through the `metrics` macros.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: Arc::new(recorder.handle()),
        }
    }

    fn register_metrics() {
        describe_counter!(
            "throttle_decisions_total",
            "Rate limit decisions by algorithm and outcome"
        );
        describe_counter!(
            "throttle_store_errors_total",
            "State store failures by error kind"
        );
        describe_counter!(
            "throttle_resets_total",
            "Rate limit records cleared by reset"
        );
        describe_histogram!(
            "throttle_store_duration_seconds",
            "Latency of check evaluations against the state store"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record an allow/deny decision
pub fn record_decision(algorithm: &str, allowed: bool) {
    let labels = [
        ("algorithm", algorithm.to_string()),
        (
            "outcome",
            if allowed { "allowed" } else { "denied" }.to_string(),
        ),
    ];
    counter!("throttle_decisions_total", &labels).increment(1);
}

/// Record a failed store interaction, labelled by error code
pub fn record_store_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!("throttle_store_errors_total", &labels).increment(1);
}

pub fn record_reset(cleared: u32) {
    counter!("throttle_resets_total").increment(u64::from(cleared));
}

pub fn record_store_duration(algorithm: &str, seconds: f64) {
    let labels = [("algorithm", algorithm.to_string())];
    histogram!("throttle_store_duration_seconds", &labels).record(seconds);
}
