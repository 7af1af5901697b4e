//! Metrics module
//!
//! Prometheus collectors registered in the default registry. Exposition is
//! left to the host process. Recording can be switched off process-wide with
//! [`set_enabled`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn recording on or off for the whole process.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether `record_*` calls update the collectors.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "s3_multer_uploads_total",
        "Total number of handled files",
        &["bucket", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "s3_multer_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "s3_multer_upload_duration_seconds",
        "Per-file upload duration in seconds",
        &["bucket", "mode"],  // "direct" or "transform"
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Fan-out metrics
    pub static ref TRANSFORM_UPLOADS: CounterVec = register_counter_vec!(
        "s3_multer_transform_uploads_total",
        "Per-transform uploads",
        &["status"]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "s3_multer_multipart_uploads_total",
        "Total multipart uploads",
        &["bucket", "status"]
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "s3_multer_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    pub static ref DELETES_TOTAL: CounterVec = register_counter_vec!(
        "s3_multer_deletes_total",
        "Delete requests",
        &["status"]
    ).unwrap();

    pub static ref CONTENT_TYPE_DETECTIONS: CounterVec = register_counter_vec!(
        "s3_multer_content_type_detections_total",
        "Sniffed content types",
        &["mime"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "s3_multer_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a successfully stored file
pub fn record_upload_success(bucket: &str, bytes: u64) {
    if !is_enabled() {
        return;
    }
    UPLOADS_TOTAL.with_label_values(&[bucket, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed file
pub fn record_upload_failure(bucket: &str) {
    if !is_enabled() {
        return;
    }
    UPLOADS_TOTAL.with_label_values(&[bucket, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(bucket: &str, mode: &str, duration_secs: f64) {
    if !is_enabled() {
        return;
    }
    UPLOAD_DURATION
        .with_label_values(&[bucket, mode])
        .observe(duration_secs);
}

/// Record one transform branch finishing
pub fn record_transform_upload(success: bool) {
    if !is_enabled() {
        return;
    }
    TRANSFORM_UPLOADS.with_label_values(&[status(success)]).inc();
}

/// Record a successful multipart upload
pub fn record_multipart_upload_success(bucket: &str, parts_count: usize) {
    if !is_enabled() {
        return;
    }
    MULTIPART_UPLOADS
        .with_label_values(&[bucket, "success"])
        .inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a failed multipart upload
pub fn record_multipart_upload_failure(bucket: &str) {
    if !is_enabled() {
        return;
    }
    MULTIPART_UPLOADS
        .with_label_values(&[bucket, "failure"])
        .inc();
}

/// Record a delete request
pub fn record_delete(success: bool) {
    if !is_enabled() {
        return;
    }
    DELETES_TOTAL.with_label_values(&[status(success)]).inc();
}

/// Record a sniffed content type
pub fn record_content_type_detection(mime: &str) {
    if !is_enabled() {
        return;
    }
    CONTENT_TYPE_DETECTIONS.with_label_values(&[mime]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    if !is_enabled() {
        return;
    }
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_record_upload_success() {
        let before = UPLOAD_BYTES_TOTAL.get();
        record_upload_success("test-bucket", 1024);
        assert!(UPLOAD_BYTES_TOTAL.get() >= before + 1024.0);
    }

    #[test]
    #[serial]
    fn test_record_upload_failure() {
        record_upload_failure("test-bucket");
        assert!(
            UPLOADS_TOTAL
                .with_label_values(&["test-bucket", "failure"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_record_transform_upload() {
        record_transform_upload(true);
        record_transform_upload(false);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_multipart_upload() {
        record_multipart_upload_success("test-bucket", 5);
        record_multipart_upload_failure("test-bucket");
        // Just verify it doesn't panic
    }

    #[test]
    #[serial]
    fn test_record_delete_and_detection() {
        record_delete(true);
        record_content_type_detection("image/png");
        assert!(
            CONTENT_TYPE_DETECTIONS
                .with_label_values(&["image/png"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_record_error() {
        record_error("transport");
        // Just verify it doesn't panic
    }

    #[test]
    #[serial]
    fn test_disabled_recording_leaves_collectors_untouched() {
        let before = UPLOADS_TOTAL
            .with_label_values(&["disabled-bucket", "success"])
            .get();

        set_enabled(false);
        record_upload_success("disabled-bucket", 10);
        set_enabled(true);

        assert_eq!(
            UPLOADS_TOTAL
                .with_label_values(&["disabled-bucket", "success"])
                .get(),
            before
        );

        record_upload_success("disabled-bucket", 10);
        assert_eq!(
            UPLOADS_TOTAL
                .with_label_values(&["disabled-bucket", "success"])
                .get(),
            before + 1.0
        );
    }
}
