//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use subsync_media::ToolPaths;

/// Name of the staging directory for uploads still being received.
pub const INCOMING_DIR: &str = ".incoming";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory holding one subdirectory per job
    pub base_dir: PathBuf,
    /// Time after which terminal jobs are reclaimed
    pub job_ttl: Duration,
    /// How often the Cleaner sweeps
    pub sweep_interval: Duration,
    /// Maximum jobs executing at once
    pub max_concurrent_jobs: usize,
    /// Upper bound on a single tool invocation (None = unbounded)
    pub tool_timeout: Option<Duration>,
    /// External tool binaries
    pub tools: ToolPaths,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp/subsync_jobs"),
            job_ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(60),
            max_concurrent_jobs: 2,
            tool_timeout: None,
            tools: ToolPaths::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tools = ToolPaths {
            detector: std::env::var("SUBSYNC_DETECTOR_BIN").unwrap_or(defaults.tools.detector),
            normalizer: std::env::var("SUBSYNC_NORMALIZER_BIN")
                .unwrap_or(defaults.tools.normalizer),
            synchronizer: std::env::var("SUBSYNC_SYNCHRONIZER_BIN")
                .unwrap_or(defaults.tools.synchronizer),
        };

        Self {
            base_dir: std::env::var("SUBSYNC_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            job_ttl: Duration::from_secs(
                std::env::var("SUBSYNC_JOB_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("SUBSYNC_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(60),
            ),
            max_concurrent_jobs: std::env::var("SUBSYNC_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            tool_timeout: std::env::var("SUBSYNC_TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            tools,
        }
    }

    /// Builder-style override of the base directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Staging area for uploads, inside the base directory so moves stay on
    /// one filesystem.
    pub fn incoming_dir(&self) -> PathBuf {
        self.base_dir.join(INCOMING_DIR)
    }

    /// TTL as a chrono duration for comparisons against record timestamps.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.job_ttl).unwrap_or(chrono::Duration::MAX)
    }
}
