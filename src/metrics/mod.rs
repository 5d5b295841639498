//! Metrics module
//!
//! Prometheus counters and histograms for the upload queue, registered in the
//! default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // Item metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "reklam_uploads_total",
        "Total number of upload items by owning record type and outcome",
        &["ref_type", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "reklam_upload_bytes_total",
        "Total bytes of successfully uploaded files"
    ).unwrap();

    pub static ref STEP_DURATION: HistogramVec = register_histogram_vec!(
        "reklam_upload_step_duration_seconds",
        "Duration of each upload protocol step in seconds",
        &["step"],  // "target_resolution", "transfer" or "link"
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Batch metrics
    pub static ref BATCHES_TOTAL: CounterVec = register_counter_vec!(
        "reklam_upload_batches_total",
        "Upload batches by outcome",
        &["outcome"]  // "all_succeeded", "some_failed" or "rejected"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "reklam_upload_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record an item that was uploaded and linked
pub fn record_upload_success(ref_type: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[ref_type, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an item that ended in error
pub fn record_upload_failure(ref_type: &str, error_type: &str) {
    UPLOADS_TOTAL.with_label_values(&[ref_type, "error"]).inc();
    record_error(error_type);
}

/// Record the duration of one protocol step
pub fn record_step_duration(step: &str, duration_secs: f64) {
    STEP_DURATION.with_label_values(&[step]).observe(duration_secs);
}

/// Record a finished or rejected batch
pub fn record_batch(outcome: &str) {
    BATCHES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&prometheus::gather())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success() {
        record_upload_success("job", 1024);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_upload_failure() {
        record_upload_failure("job_step", "link");
        // Just verify it doesn't panic
    }

    #[test]
    fn test_gather_text_contains_batches() {
        record_batch("rejected");
        let text = gather_text().unwrap();
        assert!(text.contains("reklam_upload_batches_total"));
    }
}
