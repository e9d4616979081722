//! Prometheus metrics for har-mock-server.
//!
//! Tracks mock hits, forwarded requests and capture file reloads.
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

lazy_static! {
    /// Requests handled, by outcome (mock|forwarded)
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "har_mock_requests_total",
        "Total number of requests handled",
        &["outcome"]
    )
    .unwrap();

    /// Forwarded requests whose transport failed
    pub static ref FORWARD_ERRORS_TOTAL: Counter = register_counter!(
        "har_mock_forward_errors_total",
        "Total number of forwarded requests that failed at the transport level"
    )
    .unwrap();

    /// Capture file reload activity
    pub static ref RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "har_mock_reloads_total",
        "Capture file reload events",
        &["action"]  // action: loaded|unloaded|failed
    )
    .unwrap();

    /// Capture files currently loaded
    pub static ref LOADED_FILES: Gauge = register_gauge!(
        "har_mock_loaded_files",
        "Number of capture files currently loaded"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_mock_hit() {
    REQUESTS_TOTAL.with_label_values(&["mock"]).inc();
}

pub fn record_forwarded() {
    REQUESTS_TOTAL.with_label_values(&["forwarded"]).inc();
}

pub fn record_forward_error() {
    FORWARD_ERRORS_TOTAL.inc();
}

/// Helper to record a reload action and the resulting number of loaded files
pub fn record_reload(action: &str, loaded_files: usize) {
    RELOADS_TOTAL.with_label_values(&[action]).inc();
    LOADED_FILES.set(loaded_files as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_mock_hit();
        record_forwarded();
        record_forward_error();
        record_reload("loaded", 3);

        let metrics = collect_metrics();
        assert!(metrics.contains("har_mock_requests_total"));
        assert!(metrics.contains("har_mock_forward_errors_total"));
        assert!(metrics.contains("har_mock_reloads_total"));
        assert!(metrics.contains("har_mock_loaded_files"));
    }
}
