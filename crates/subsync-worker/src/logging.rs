//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use subsync_models::{JobId, StageKind};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID and operation, so interleaved output from
/// concurrent jobs can be told apart.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    ///
    /// # Arguments
    /// * `job_id` - The unique identifier for the job
    /// * `operation` - The type of operation (e.g., "subtitle_sync")
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    /// Log a pipeline stage event, tagged with the stage name.
    pub fn log_stage(&self, stage: StageKind, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            "Stage {}: {}", stage, message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    /// Create a tracing span for this job.
    ///
    /// The runner instruments the whole execution with it, so tool and store
    /// events emitted inside inherit the job ID.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_without_subscriber_is_noop() {
        let logger = JobLogger::new(&JobId::from("abc"), "sweep");
        logger.log_start("begin");
        logger.log_progress("half");
        logger.log_stage(StageKind::Synchronization, "aligned");
        logger.log_warning("slow");
        logger.log_error("bad");
        logger.log_completion("done");
        let _span = logger.create_span();
    }

    #[test]
    fn test_span_carries_job_fields() {
        let logger = JobLogger::new(&JobId::from("abc"), "subtitle_sync");
        let span = logger.create_span();
        // Disabled without a subscriber, but the metadata is still static
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "job");
            assert!(meta.fields().field("job_id").is_some());
            assert!(meta.fields().field("operation").is_some());
        }
    }
}
