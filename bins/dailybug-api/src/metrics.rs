// Prometheus metrics for the grading API

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use tracing::warn;

lazy_static! {
    pub static ref GRADING_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "dailybug_grading_requests_total",
        "Grading requests by language and outcome",
        &["language", "outcome"]
    )
    .expect("grading request counter registers once");

    pub static ref GRADING_DURATION: HistogramVec = register_histogram_vec!(
        "dailybug_grading_duration_seconds",
        "End-to-end grading latency, sandbox round trip included",
        &["language"]
    )
    .expect("grading duration histogram registers once");
}

pub fn record_grading(language: &str, outcome: &str, seconds: f64) {
    GRADING_REQUESTS.with_label_values(&[language, outcome]).inc();
    GRADING_DURATION.with_label_values(&[language]).observe(seconds);
}

/// Text exposition of the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
