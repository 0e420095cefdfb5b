//! Metrics module
//!
//! Provides Prometheus counters for uploads and bucket probes.

use lazy_static::lazy_static;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_uploads_total",
        "Total number of uploads",
        &["kind", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    // Bucket probe metrics
    pub static ref BUCKET_PROBES_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_bucket_probes_total",
        "Bucket existence probes by outcome",
        &["outcome"]  // "exists", "not_found", "inaccessible" or "error"
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(kind: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[kind, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(kind: &str) {
    UPLOADS_TOTAL.with_label_values(&[kind, "failure"]).inc();
}

/// Record the outcome of a bucket probe
pub fn record_bucket_probe(outcome: &str) {
    BUCKET_PROBES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Encode all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
