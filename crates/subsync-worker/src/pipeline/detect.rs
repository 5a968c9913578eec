//! Encoding detection stage.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use subsync_media::{detector_command, parse_detector_output, LogSink, MediaResult};
use subsync_models::StageKind;

use super::{PipelineStage, StageContext, Toolbox};

/// Resolves the subtitle's encoding, from the override or the detector.
#[derive(Debug, Clone, Default)]
pub struct EncodingDetection;

impl EncodingDetection {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineStage for EncodingDetection {
    fn kind(&self) -> StageKind {
        StageKind::EncodingDetection
    }

    fn required_inputs(&self, ctx: &StageContext) -> Vec<PathBuf> {
        vec![ctx.subtitle.clone()]
    }

    fn output_path(&self, _ctx: &StageContext) -> Option<PathBuf> {
        None
    }

    async fn execute(
        &self,
        ctx: &mut StageContext,
        tools: &Toolbox,
        sink: &dyn LogSink,
    ) -> MediaResult<String> {
        if let Some(encoding) = ctx.encoding_override.clone() {
            debug!(job_id = %ctx.job_id, "Skipping detection, override {}", encoding);
            ctx.encoding = Some(encoding.clone());
            return Ok(format!("Skipped: using encoding override {encoding}"));
        }

        let cmd = detector_command(&tools.paths, &ctx.subtitle);
        let output = tools.runner.run(&cmd, sink).await?;
        let encoding = parse_detector_output(&output.stdout)?;

        ctx.encoding = Some(encoding.clone());
        Ok(format!("Detected encoding {encoding}"))
    }
}
