//! Timeline events and captured log lines.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::StageKind;

/// Kind of stage transition recorded on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    StageStart,
    StageSuccess,
    StageFailure,
}

/// Append-only record of a stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineEvent {
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
    /// Stage the event belongs to
    pub stage: StageKind,
    /// Transition kind
    pub kind: EventKind,
    /// Free-form description
    pub message: String,
}

impl TimelineEvent {
    pub fn new(stage: StageKind, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// Output stream a log line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    Out,
    Err,
}

impl StreamTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTag::Out => "out",
            StreamTag::Err => "err",
        }
    }
}

/// One line of external tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogLine {
    /// When the line was captured
    pub timestamp: DateTime<Utc>,
    /// Stream tag (out/err)
    pub stream: StreamTag,
    /// Stage whose tool produced the line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    /// Line text without the trailing newline
    pub text: String,
}

impl LogLine {
    pub fn new(stream: StreamTag, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            stage: None,
            text: text.into(),
        }
    }

    pub fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }
}
