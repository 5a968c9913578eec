//! Worker error types.

use thiserror::Error;

use subsync_models::{ErrorKind, JobId, JobStatus, TransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    Duplicate(JobId),

    #[error("Result not available for job {id} (status: {status})")]
    ResultUnavailable { id: JobId, status: JobStatus },

    #[error("Job {0} has no backups")]
    NoBackups(JobId),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Media error: {0}")]
    Media(#[from] subsync_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Map onto the job-visible taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::NotFound(_)
            | WorkerError::ResultUnavailable { .. }
            | WorkerError::NoBackups(_) => ErrorKind::NotFound,
            WorkerError::Media(e) => e.kind(),
            WorkerError::Duplicate(_)
            | WorkerError::Archive(_)
            | WorkerError::Transition(_)
            | WorkerError::Io(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subsync_media::MediaError;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(WorkerError::NotFound(JobId::new()).kind(), ErrorKind::NotFound);
        assert_eq!(
            WorkerError::ResultUnavailable {
                id: JobId::new(),
                status: JobStatus::Running
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            WorkerError::from(MediaError::ToolNotFound("ffsubsync".into())).kind(),
            ErrorKind::ToolNotFound
        );
        assert_eq!(
            WorkerError::from(std::io::Error::other("disk")).kind(),
            ErrorKind::Internal
        );
    }
}
