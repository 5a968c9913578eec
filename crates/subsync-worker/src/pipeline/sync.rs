//! Synchronization stage.

use std::path::PathBuf;

use async_trait::async_trait;

use subsync_media::{synchronizer_command, LogSink, MediaResult};
use subsync_models::StageKind;

use super::{ensure_output, PipelineStage, StageContext, Toolbox};

/// Aligns the subtitle against the reference video's audio.
#[derive(Debug, Clone, Default)]
pub struct Synchronization;

impl Synchronization {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineStage for Synchronization {
    fn kind(&self) -> StageKind {
        StageKind::Synchronization
    }

    fn required_inputs(&self, ctx: &StageContext) -> Vec<PathBuf> {
        vec![ctx.video.clone(), ctx.subtitle.clone()]
    }

    fn output_path(&self, ctx: &StageContext) -> Option<PathBuf> {
        Some(ctx.work_dir().join("aligned.srt"))
    }

    async fn execute(
        &self,
        ctx: &mut StageContext,
        tools: &Toolbox,
        sink: &dyn LogSink,
    ) -> MediaResult<String> {
        let output = ctx.work_dir().join("aligned.srt");
        let cmd = synchronizer_command(&tools.paths, &ctx.video, &ctx.subtitle, &output);
        tools.runner.run(&cmd, sink).await?;
        ensure_output(&output)?;

        ctx.aligned = Some(output);
        Ok("Subtitle aligned to video".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subsync_models::{JobId, SubtitleFormat};

    #[test]
    fn test_declares_inputs_and_output() {
        let ctx = StageContext::new(
            JobId::new(),
            "/j",
            "/j/original_video.mkv",
            "/j/.work/normalized.srt",
            SubtitleFormat::Srt,
            None,
        );
        let stage = Synchronization::new();
        assert_eq!(
            stage.required_inputs(&ctx),
            vec![
                PathBuf::from("/j/original_video.mkv"),
                PathBuf::from("/j/.work/normalized.srt")
            ]
        );
        assert_eq!(stage.output_path(&ctx), Some(PathBuf::from("/j/.work/aligned.srt")));
    }
}
