//! Argument builders for the three external subtitle tools.
//!
//! - Encoding detector (`uchardet`): `<subtitle>`, prints a charset name.
//! - Normalizer (`pysubs2`): converts any supported subtitle to UTF-8 SRT.
//! - Synchronizer (`ffsubsync`): aligns a subtitle against a reference video.

use std::path::Path;

use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};

pub const DEFAULT_DETECTOR: &str = "uchardet";
pub const DEFAULT_NORMALIZER: &str = "pysubs2";
pub const DEFAULT_SYNCHRONIZER: &str = "ffsubsync";

/// Labels the detector may print for Korean Unified Hangul Code.
const UHC_LABELS: &[&str] = &[
    "uhc",
    "cp949",
    "ms949",
    "ms_949",
    "windows-949",
    "949",
    "ks_c_5601-1987",
];

/// Labels that need no transcoding before synchronization.
const UTF8_COMPATIBLE: &[&str] = &["utf-8", "utf8", "ascii", "us-ascii"];

/// Program names or paths of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub detector: String,
    pub normalizer: String,
    pub synchronizer: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            detector: DEFAULT_DETECTOR.to_string(),
            normalizer: DEFAULT_NORMALIZER.to_string(),
            synchronizer: DEFAULT_SYNCHRONIZER.to_string(),
        }
    }
}

/// Build the encoding detector invocation.
pub fn detector_command(paths: &ToolPaths, subtitle: &Path) -> ToolCommand {
    ToolCommand::new(&paths.detector).path_arg(subtitle)
}

/// Build the normalizer invocation (any supported format → UTF-8 SRT).
pub fn normalizer_command(
    paths: &ToolPaths,
    input: &Path,
    output: &Path,
    input_encoding: &str,
) -> ToolCommand {
    ToolCommand::new(&paths.normalizer)
        .args(["--to", "srt", "--input-enc", input_encoding, "--output-enc", "utf-8", "-o"])
        .path_arg(output)
        .path_arg(input)
}

/// Build the synchronizer invocation.
pub fn synchronizer_command(
    paths: &ToolPaths,
    video: &Path,
    subtitle: &Path,
    output: &Path,
) -> ToolCommand {
    ToolCommand::new(&paths.synchronizer)
        .path_arg(video)
        .arg("-i")
        .path_arg(subtitle)
        .arg("-o")
        .path_arg(output)
        .args(["--encoding", "utf-8", "--output-encoding", "utf-8"])
}

/// Normalize an encoding label from the detector or a caller override.
///
/// Returns `None` for empty or `unknown` labels.
pub fn normalize_encoding_label(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() || normalized == "unknown" {
        return None;
    }

    if UHC_LABELS.contains(&normalized.as_str()) {
        return Some("uhc".to_string());
    }

    Some(normalized)
}

/// Extract the charset from the detector's stdout.
pub fn parse_detector_output(stdout: &[String]) -> MediaResult<String> {
    stdout
        .iter()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| normalize_encoding_label(line))
        .ok_or(MediaError::EncodingUndetected)
}

/// Whether text in `encoding` can be fed to the synchronizer unchanged.
pub fn is_utf8_compatible(encoding: &str) -> bool {
    UTF8_COMPATIBLE.contains(&encoding.trim().to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalizer_arguments() {
        let cmd = normalizer_command(
            &ToolPaths::default(),
            &PathBuf::from("/j/in.smi"),
            &PathBuf::from("/j/.work/normalized.srt"),
            "uhc",
        );
        assert_eq!(cmd.program(), "pysubs2");
        assert_eq!(
            cmd.build_args(),
            vec![
                "--to",
                "srt",
                "--input-enc",
                "uhc",
                "--output-enc",
                "utf-8",
                "-o",
                "/j/.work/normalized.srt",
                "/j/in.smi"
            ]
        );
    }

    #[test]
    fn test_synchronizer_arguments() {
        let paths = ToolPaths {
            synchronizer: "/opt/bin/ffsubsync".to_string(),
            ..Default::default()
        };
        let cmd = synchronizer_command(
            &paths,
            &PathBuf::from("video.mp4"),
            &PathBuf::from("sub.srt"),
            &PathBuf::from("out.srt"),
        );
        assert_eq!(cmd.program(), "/opt/bin/ffsubsync");
        assert_eq!(
            cmd.build_args(),
            vec![
                "video.mp4",
                "-i",
                "sub.srt",
                "-o",
                "out.srt",
                "--encoding",
                "utf-8",
                "--output-encoding",
                "utf-8"
            ]
        );
    }

    #[test]
    fn test_detector_arguments() {
        let cmd = detector_command(&ToolPaths::default(), &PathBuf::from("a.srt"));
        assert_eq!(cmd.program(), "uchardet");
        assert_eq!(cmd.build_args(), vec!["a.srt"]);
    }

    #[test]
    fn test_normalize_encoding_label() {
        assert_eq!(normalize_encoding_label(" UTF-8\n"), Some("utf-8".to_string()));
        assert_eq!(normalize_encoding_label("CP949"), Some("uhc".to_string()));
        assert_eq!(normalize_encoding_label("ks_c_5601-1987"), Some("uhc".to_string()));
        assert_eq!(normalize_encoding_label("unknown"), None);
        assert_eq!(normalize_encoding_label("   "), None);
    }

    #[test]
    fn test_parse_detector_output() {
        let stdout = vec!["".to_string(), "WINDOWS-1252".to_string()];
        assert_eq!(parse_detector_output(&stdout).unwrap(), "windows-1252");

        let err = parse_detector_output(&["UNKNOWN".to_string()]).unwrap_err();
        assert!(matches!(err, MediaError::EncodingUndetected));
        tokio_test::assert_err!(parse_detector_output(&[]));
    }

    #[test]
    fn test_utf8_compatibility() {
        assert!(is_utf8_compatible("utf-8"));
        assert!(is_utf8_compatible("ASCII"));
        assert!(!is_utf8_compatible("uhc"));
        assert!(!is_utf8_compatible("windows-1252"));
    }
}
