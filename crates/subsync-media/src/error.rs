//! Error types for external tool operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use subsync_models::ErrorKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running external subtitle tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} exited with {}", describe_exit(.exit_code))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr_tail: Vec<String>,
    },

    #[error("{tool} timed out after {limit:?}")]
    Timeout { tool: String, limit: Duration },

    #[error("Unable to detect subtitle encoding")]
    EncodingUndetected,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: impl std::borrow::Borrow<Option<i32>>) -> String {
    match code.borrow() {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(tool: impl Into<String>, exit_code: Option<i32>, stderr_tail: Vec<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            exit_code,
            stderr_tail,
        }
    }

    /// Map onto the job-visible taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            MediaError::ToolFailed { .. } | MediaError::EncodingUndetected => ErrorKind::ToolExecutionFailed,
            MediaError::Timeout { .. } => ErrorKind::Timeout,
            MediaError::FileNotFound(_) | MediaError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Captured stderr tail, if the error came from a tool exit.
    pub fn stderr_tail(&self) -> &[String] {
        match self {
            MediaError::ToolFailed { stderr_tail, .. } => stderr_tail,
            _ => &[],
        }
    }
}
