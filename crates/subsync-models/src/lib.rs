//! Shared data models for the subtitle sync service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and records
//! - Pipeline stages and timeline events
//! - Captured tool output lines
//! - Accepted input formats
//! - The job-visible error taxonomy

pub mod error;
pub mod event;
pub mod format;
pub mod job;
pub mod stage;

// Re-export common types
pub use error::{ErrorKind, JobError};
pub use event::{EventKind, LogLine, StreamTag, TimelineEvent};
pub use format::{SubtitleFormat, VideoFormat, SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};
pub use job::{JobId, JobRecord, JobStatus, TransitionError};
pub use stage::StageKind;
