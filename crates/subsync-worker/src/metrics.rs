//! Job metrics recorded by the worker.
//!
//! Recording is a no-op until a recorder is installed (the API binary
//! installs the Prometheus exporter).

use metrics::{counter, histogram};

use subsync_models::{ErrorKind, StageKind};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "subsync_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "subsync_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "subsync_jobs_failed_total";
    pub const STAGE_DURATION_SECONDS: &str = "subsync_stage_duration_seconds";
    pub const JOBS_SWEPT_TOTAL: &str = "subsync_jobs_swept_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(kind: ErrorKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record how long one stage's tool ran.
pub fn record_stage_duration(stage: StageKind, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_jobs_swept(count: usize) {
    if count > 0 {
        counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
    }
}
