//! Pipeline stages.
//!
//! Each stage wraps one external tool invocation and implements the
//! [`PipelineStage`] trait. Stages run strictly in [`StageKind::ALL`] order
//! and share a mutable [`StageContext`] that carries the current subtitle
//! path and the resolved encoding forward.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use subsync_media::{LogSink, MediaError, MediaResult, ToolPaths, ToolRunner};
use subsync_models::{JobId, StageKind, SubtitleFormat};

pub mod detect;
pub mod normalize;
pub mod sync;

pub use detect::EncodingDetection;
pub use normalize::SubtitleNormalization;
pub use sync::Synchronization;

/// Directory for intermediates, relative to the job directory.
pub const WORK_DIR: &str = ".work";

/// Runner plus tool binaries shared by all stages.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    pub runner: ToolRunner,
    pub paths: ToolPaths,
}

impl Toolbox {
    pub fn new(runner: ToolRunner, paths: ToolPaths) -> Self {
        Self { runner, paths }
    }
}

/// Per-job state threaded through the stages.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: JobId,
    /// Directory owned by the job
    pub job_dir: PathBuf,
    /// Reference video
    pub video: PathBuf,
    /// Subtitle the next stage reads; stages replace it with their output
    pub subtitle: PathBuf,
    pub subtitle_format: SubtitleFormat,
    /// Caller-supplied encoding, already trimmed and lower-cased
    pub encoding_override: Option<String>,
    /// Encoding resolved by detection or the override
    pub encoding: Option<String>,
    /// Synchronizer output, set once alignment succeeds
    pub aligned: Option<PathBuf>,
}

impl StageContext {
    pub fn new(
        job_id: JobId,
        job_dir: impl Into<PathBuf>,
        video: impl Into<PathBuf>,
        subtitle: impl Into<PathBuf>,
        subtitle_format: SubtitleFormat,
        encoding_override: Option<String>,
    ) -> Self {
        Self {
            job_id,
            job_dir: job_dir.into(),
            video: video.into(),
            subtitle: subtitle.into(),
            subtitle_format,
            encoding_override,
            encoding: None,
            aligned: None,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.job_dir.join(WORK_DIR)
    }
}

/// One external-tool step of the pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Label shown as the job's current step while this stage runs.
    fn label(&self) -> &'static str {
        self.kind().label()
    }

    /// Files that must exist before the stage starts.
    fn required_inputs(&self, ctx: &StageContext) -> Vec<PathBuf>;

    /// File the stage writes, if any.
    fn output_path(&self, ctx: &StageContext) -> Option<PathBuf>;

    /// Check that every required input is present.
    fn validate(&self, ctx: &StageContext) -> MediaResult<()> {
        for input in self.required_inputs(ctx) {
            if !input.exists() {
                return Err(MediaError::FileNotFound(input));
            }
        }
        Ok(())
    }

    /// Run the stage, streaming tool output to `sink`.
    ///
    /// Returns the message recorded on the stage's success event.
    async fn execute(
        &self,
        ctx: &mut StageContext,
        tools: &Toolbox,
        sink: &dyn LogSink,
    ) -> MediaResult<String>;
}

/// The three stages in execution order.
pub fn default_pipeline() -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(EncodingDetection::new()),
        Box::new(SubtitleNormalization::new()),
        Box::new(Synchronization::new()),
    ]
}

/// Error unless a tool that exited 0 actually produced `output`.
pub(crate) fn ensure_output(output: &Path) -> MediaResult<()> {
    if output.exists() {
        Ok(())
    } else {
        Err(MediaError::FileNotFound(output.to_path_buf()))
    }
}
