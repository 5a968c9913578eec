//! CLI wrappers for the external subtitle tools.
//!
//! This crate provides:
//! - Type-safe tool command building
//! - A subprocess runner that streams stdout/stderr line by line
//! - Argument builders for the detector, normalizer and synchronizer
//! - Encoding label normalization
//! - Filesystem helpers for job directories

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod tools;

pub use command::{check_tool, LogSink, ToolCommand, ToolOutput, ToolRunner, STDERR_TAIL_LINES};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{copy_file, move_file, remove_dir_idempotent};
pub use tools::{
    detector_command, is_utf8_compatible, normalize_encoding_label, normalizer_command,
    parse_detector_output, synchronizer_command, ToolPaths,
};
