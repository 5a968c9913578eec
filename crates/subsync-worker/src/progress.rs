//! Progress computation and the status read model.

use schemars::JsonSchema;
use serde::Serialize;

use subsync_models::{
    EventKind, JobError, JobId, JobRecord, JobStatus, LogLine, StageKind, TimelineEvent,
};

/// Translates stage progression into percentages and timeline events.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    total_stages: usize,
}

impl ProgressReporter {
    pub fn new(total_stages: usize) -> Self {
        Self { total_stages }
    }

    /// `floor(100 * completed / total)`.
    ///
    /// The record caps this below 100 until the job succeeds.
    pub fn percent(&self, completed: usize) -> u8 {
        if self.total_stages == 0 {
            return 0;
        }
        let completed = completed.min(self.total_stages);
        (100 * completed / self.total_stages) as u8
    }

    pub fn stage_started(&self, stage: StageKind) -> TimelineEvent {
        TimelineEvent::new(stage, EventKind::StageStart, stage.label())
    }

    pub fn stage_succeeded(&self, stage: StageKind, message: impl Into<String>) -> TimelineEvent {
        TimelineEvent::new(stage, EventKind::StageSuccess, message)
    }

    pub fn stage_failed(&self, stage: StageKind, error: &JobError) -> TimelineEvent {
        TimelineEvent::new(stage, EventKind::StageFailure, error.message.clone())
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(StageKind::ALL.len())
    }
}

/// What a status poll returns.
///
/// Always the full history so far; clients need no cursor between polls.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatusSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub events: Vec<TimelineEvent>,
    pub logs: Vec<LogLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Aligned subtitle can be downloaded
    pub result_available: bool,
    /// Number of backed-up subtitles in the archive
    pub backup_count: usize,
}

impl From<JobRecord> for StatusSnapshot {
    fn from(record: JobRecord) -> Self {
        Self {
            result_available: record.status == JobStatus::Succeeded && record.result_path.is_some(),
            backup_count: record.backup_paths.len(),
            job_id: record.id,
            status: record.status,
            progress: record.progress,
            current_step: record.current_step,
            events: record.events,
            logs: record.logs,
            encoding: record.encoding,
            error: record.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        let reporter = ProgressReporter::default();
        assert_eq!(reporter.percent(0), 0);
        assert_eq!(reporter.percent(1), 33);
        assert_eq!(reporter.percent(2), 66);
        assert_eq!(reporter.percent(3), 100);
        assert_eq!(reporter.percent(7), 100);
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(ProgressReporter::new(0).percent(0), 0);
    }

    #[test]
    fn test_event_builders() {
        let reporter = ProgressReporter::default();
        let started = reporter.stage_started(StageKind::Synchronization);
        assert_eq!(started.kind, EventKind::StageStart);
        assert_eq!(started.message, "Synchronizing subtitle");

        let error = JobError::internal("boom");
        let failed = reporter.stage_failed(StageKind::Synchronization, &error);
        assert_eq!(failed.kind, EventKind::StageFailure);
        assert_eq!(failed.message, "boom");
    }

    #[test]
    fn test_snapshot_from_record() {
        let mut record = JobRecord::new(JobId::new(), "/tmp/j", "clip");
        record.start().unwrap();
        record.succeed("/tmp/j/clip.srt").unwrap();

        let snapshot = StatusSnapshot::from(record);
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.result_available);
        assert_eq!(snapshot.backup_count, 0);
    }
}
