//! Pipeline stage identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One external-tool step of the pipeline.
///
/// The declaration order is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Detect the subtitle's character encoding
    EncodingDetection,
    /// Convert the subtitle to UTF-8 SRT when needed
    SubtitleNormalization,
    /// Align the subtitle against the video's timing
    Synchronization,
}

impl StageKind {
    /// All stages in execution order.
    pub const ALL: [StageKind; 3] = [
        StageKind::EncodingDetection,
        StageKind::SubtitleNormalization,
        StageKind::Synchronization,
    ];

    /// Stable machine name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::EncodingDetection => "encoding_detection",
            StageKind::SubtitleNormalization => "subtitle_normalization",
            StageKind::Synchronization => "synchronization",
        }
    }

    /// Human-readable label shown as the job's current step.
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::EncodingDetection => "Detecting subtitle encoding",
            StageKind::SubtitleNormalization => "Normalizing subtitle",
            StageKind::Synchronization => "Synchronizing subtitle",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn position(&self) -> usize {
        match self {
            StageKind::EncodingDetection => 0,
            StageKind::SubtitleNormalization => 1,
            StageKind::Synchronization => 2,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_position_order() {
        for (i, stage) in StageKind::ALL.iter().enumerate() {
            assert_eq!(stage.position(), i);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&StageKind::SubtitleNormalization).unwrap();
        assert_eq!(json, "\"subtitle_normalization\"");
        assert_eq!(StageKind::Synchronization.to_string(), "synchronization");
    }
}
