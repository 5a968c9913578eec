//! Job records and lifecycle transitions.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::{JobError, LogLine, TimelineEvent};

/// Step label of a job that has not started yet.
pub const STEP_QUEUED: &str = "Queued";
/// Step label of a job that finished successfully.
pub const STEP_COMPLETE: &str = "Complete";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a runner
    #[default]
    Pending,
    /// Stages are executing
    Running,
    /// All stages succeeded
    Succeeded,
    /// Pre-flight validation or a stage failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// Pending may fail directly when pre-flight validation rejects the inputs.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Full state of one job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,
    /// Lifecycle status
    pub status: JobStatus,
    /// Accepted and waiting for a free execution slot
    #[serde(default)]
    pub queued: bool,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable label of the current step
    pub current_step: String,
    /// Stage transitions, oldest first
    pub events: Vec<TimelineEvent>,
    /// Captured tool output, oldest first
    pub logs: Vec<LogLine>,
    /// When the job was accepted
    pub created_at: DateTime<Utc>,
    /// When the runner picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
    /// Directory owned by this job
    pub directory: PathBuf,
    /// Base filename of the uploaded video, used to name results
    pub video_basename: String,
    /// Encoding the subtitle was read with (override or detected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Aligned subtitle (only on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    /// Pre-existing subtitles preserved before being overwritten
    #[serde(default)]
    pub backup_paths: Vec<PathBuf>,
    /// Failure details (only on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobRecord {
    /// Create a new pending job record.
    pub fn new(id: JobId, directory: impl Into<PathBuf>, video_basename: impl Into<String>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            queued: false,
            progress: 0,
            current_step: STEP_QUEUED.to_string(),
            events: Vec::new(),
            logs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            terminal_at: None,
            directory: directory.into(),
            video_basename: video_basename.into(),
            encoding: None,
            result_path: None,
            backup_paths: Vec::new(),
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.terminal_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Hand a Pending job to the runner queue.
    pub fn enqueue(&mut self) {
        if self.status == JobStatus::Pending {
            self.queued = true;
        }
    }

    /// Take a Pending job back out of the queue without starting it.
    pub fn dequeue(&mut self) {
        self.queued = false;
    }

    /// Move from Pending to Running.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)?;
        self.queued = false;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Raise progress while running.
    ///
    /// Progress never decreases and stays below 100 until the job succeeds.
    pub fn advance_progress(&mut self, progress: u8) {
        if self.status != JobStatus::Running {
            return;
        }
        self.progress = self.progress.max(progress.min(99));
    }

    /// Append a timeline event.
    pub fn push_event(&mut self, event: TimelineEvent) {
        self.events.push(event);
    }

    /// Append a captured output line.
    pub fn push_log(&mut self, line: LogLine) {
        self.logs.push(line);
    }

    /// Mark the job as succeeded with its aligned subtitle.
    pub fn succeed(&mut self, result_path: impl Into<PathBuf>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Succeeded)?;
        self.progress = 100;
        self.current_step = STEP_COMPLETE.to_string();
        self.result_path = Some(result_path.into());
        Ok(())
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Timestamp the TTL is measured from.
    pub fn expiry_reference(&self) -> DateTime<Utc> {
        self.terminal_at.unwrap_or(self.created_at)
    }

    /// Whether the Cleaner may reclaim this job.
    ///
    /// Running jobs and queued Pending jobs are never eligible regardless of
    /// age. A Pending job that nothing will ever start is.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if self.status == JobStatus::Running || (self.status == JobStatus::Pending && self.queued) {
            return false;
        }
        now - self.expiry_reference() >= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, StageKind};

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), "/tmp/job", "clip")
    }

    #[test]
    fn test_job_id_is_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::new().as_str().len(), 32);
    }

    #[test]
    fn test_job_record_creation() {
        let job = record();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.current_step, STEP_QUEUED);
        assert!(job.terminal_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_successful_lifecycle() {
        let mut job = record();
        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.advance_progress(33);
        job.advance_progress(100);
        assert_eq!(job.progress, 99);

        job.succeed("/tmp/job/clip.srt").unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress, 100);
        assert_eq!(job.current_step, STEP_COMPLETE);
        assert!(job.terminal_at.is_some());
        assert!(job.result_path.is_some());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = record();
        job.start().unwrap();
        job.advance_progress(66);
        job.advance_progress(33);
        assert_eq!(job.progress, 66);
    }

    #[test]
    fn test_progress_ignored_when_not_running() {
        let mut job = record();
        job.advance_progress(50);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_status_never_regresses() {
        let mut job = record();
        job.start().unwrap();
        job.fail(JobError::new(ErrorKind::ToolExecutionFailed, "exit 1").with_stage(StageKind::Synchronization))
            .unwrap();

        assert!(job.start().is_err());
        assert!(job.succeed("/tmp/x").is_err());
        let err = job.fail(JobError::internal("again")).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert!(job.result_path.is_none());
    }

    #[test]
    fn test_pending_may_fail_directly() {
        let mut job = record();
        job.fail(JobError::unsupported_format("notes.txt")).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.events.is_empty());
    }

    #[test]
    fn test_pending_cannot_succeed() {
        let mut job = record();
        assert!(job.succeed("/tmp/x").is_err());
    }

    #[test]
    fn test_expiry() {
        let ttl = Duration::seconds(60);
        let mut job = record();
        let now = Utc::now();
        assert!(!job.is_expired(now, ttl));
        assert!(job.is_expired(now + Duration::seconds(61), ttl));

        job.start().unwrap();
        assert!(!job.is_expired(now + Duration::seconds(3600), ttl));

        job.fail(JobError::internal("x")).unwrap();
        let terminal_at = job.terminal_at.unwrap();
        assert_eq!(job.expiry_reference(), terminal_at);
        assert!(job.is_expired(terminal_at + ttl, ttl));
    }

    #[test]
    fn test_queued_job_outlives_ttl() {
        let ttl = Duration::seconds(1);
        let mut job = record();
        job.enqueue();
        assert!(job.queued);

        let much_later = job.created_at + Duration::days(1);
        assert!(!job.is_expired(much_later, ttl));

        job.start().unwrap();
        assert!(!job.queued);
        job.fail(JobError::internal("x")).unwrap();
        assert!(job.is_expired(job.terminal_at.unwrap() + ttl, ttl));
    }

    #[test]
    fn test_dequeued_pending_job_expires() {
        let ttl = Duration::seconds(1);
        let mut job = record();
        job.enqueue();
        job.dequeue();
        assert!(job.is_expired(job.created_at + ttl, ttl));
    }

    #[test]
    fn test_enqueue_ignored_after_terminal() {
        let mut job = record();
        job.fail(JobError::unsupported_format("notes.txt")).unwrap();
        job.enqueue();
        assert!(!job.queued);
    }
}
