//! Accepted input formats.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Video extensions accepted for submission.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov"];

/// Subtitle extensions accepted for submission.
pub const SUBTITLE_EXTENSIONS: &[&str] = &["smi", "sami", "srt", "ass", "ssa", "sub", "vtt"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Video container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mkv,
    Mp4,
    Avi,
    Mov,
}

impl VideoFormat {
    /// Parse a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mkv" => Some(VideoFormat::Mkv),
            "mp4" => Some(VideoFormat::Mp4),
            "avi" => Some(VideoFormat::Avi),
            "mov" => Some(VideoFormat::Mov),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        extension_of(path.as_ref()).and_then(|e| Self::from_extension(&e))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mkv => "mkv",
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Avi => "avi",
            VideoFormat::Mov => "mov",
        }
    }
}

/// Subtitle file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// SAMI family (`.smi`, `.sami`)
    Sami,
    Srt,
    Ass,
    Ssa,
    Sub,
    Vtt,
}

impl SubtitleFormat {
    /// Parse a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "smi" | "sami" => Some(SubtitleFormat::Sami),
            "srt" => Some(SubtitleFormat::Srt),
            "ass" => Some(SubtitleFormat::Ass),
            "ssa" => Some(SubtitleFormat::Ssa),
            "sub" => Some(SubtitleFormat::Sub),
            "vtt" => Some(SubtitleFormat::Vtt),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        extension_of(path.as_ref()).and_then(|e| Self::from_extension(&e))
    }

    /// Canonical extension used when storing a file of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Sami => "smi",
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Ssa => "ssa",
            SubtitleFormat::Sub => "sub",
            SubtitleFormat::Vtt => "vtt",
        }
    }

    pub fn is_sami(&self) -> bool {
        matches!(self, SubtitleFormat::Sami)
    }
}
