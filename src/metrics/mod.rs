//! Metrics module
//!
//! Prometheus metrics for upload sessions and object store calls.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec,
    register_int_gauge, Counter, CounterVec, Histogram, HistogramVec, IntGauge,
};

lazy_static! {
    // Session metrics
    pub static ref SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        "stream_uploadr_sessions_total",
        "Upload sessions by final state",
        &["state"]
    ).unwrap();

    pub static ref ACTIVE_SESSIONS: IntGauge = register_int_gauge!(
        "stream_uploadr_active_sessions",
        "Upload sessions currently receiving data"
    ).unwrap();

    pub static ref PARTS_PER_SESSION: Histogram = register_histogram!(
        "stream_uploadr_parts_per_session",
        "Number of parts uploaded per session",
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 1000.0]
    ).unwrap();

    // Data metrics
    pub static ref INGESTED_BYTES: Counter = register_counter!(
        "stream_uploadr_ingested_bytes_total",
        "Bytes received from producers"
    ).unwrap();

    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "stream_uploadr_parts_total",
        "Part uploads by outcome",
        &["status"]
    ).unwrap();

    pub static ref PART_BYTES: Counter = register_counter!(
        "stream_uploadr_part_bytes_total",
        "Bytes stored through part uploads"
    ).unwrap();

    pub static ref FALLBACK_WRITES: CounterVec = register_counter_vec!(
        "stream_uploadr_fallback_writes_total",
        "Whole-object writes by outcome",
        &["status"]
    ).unwrap();

    pub static ref ABORTS_TOTAL: CounterVec = register_counter_vec!(
        "stream_uploadr_aborts_total",
        "Multipart upload aborts by outcome",
        &["status"]
    ).unwrap();

    // Object store metrics
    pub static ref STORE_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "stream_uploadr_store_call_duration_seconds",
        "Object store call duration in seconds",
        &["operation", "status"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "stream_uploadr_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Record a chunk received from a producer
pub fn record_chunk(bytes: usize) {
    INGESTED_BYTES.inc_by(bytes as f64);
}

/// Record a part upload
pub fn record_part(ok: bool, bytes: usize) {
    PARTS_TOTAL.with_label_values(&[status(ok)]).inc();
    if ok {
        PART_BYTES.inc_by(bytes as f64);
    }
}

/// Record a whole-object write
pub fn record_fallback_write(ok: bool) {
    FALLBACK_WRITES.with_label_values(&[status(ok)]).inc();
}

/// Record a multipart abort
pub fn record_abort(ok: bool) {
    ABORTS_TOTAL.with_label_values(&[status(ok)]).inc();
}

/// Record one object store call
///
/// # Arguments
/// * `operation` - S3 operation name, e.g. `upload_part`
/// * `ok` - Whether the call succeeded
/// * `duration_secs` - Wall time of the call
pub fn record_store_call(operation: &str, ok: bool, duration_secs: f64) {
    STORE_CALL_DURATION
        .with_label_values(&[operation, status(ok)])
        .observe(duration_secs);
    if !ok {
        record_error(operation);
    }
}

/// Record a session reaching a terminal state
pub fn record_session_finished(state: &str, parts: usize) {
    SESSIONS_TOTAL.with_label_values(&[state]).inc();
    PARTS_PER_SESSION.observe(parts as f64);
}

pub fn session_opened() {
    ACTIVE_SESSIONS.inc();
}

pub fn session_closed() {
    ACTIVE_SESSIONS.dec();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
