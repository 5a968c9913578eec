//! Subtitle normalization stage.
//!
//! SAMI subtitles and non-UTF-8 text go through the normalizer and come out
//! as UTF-8 SRT. Anything else is copied forward unchanged.

use std::path::PathBuf;

use async_trait::async_trait;

use subsync_media::{copy_file, is_utf8_compatible, normalizer_command, LogSink, MediaResult};
use subsync_models::{StageKind, SubtitleFormat};

use super::{ensure_output, PipelineStage, StageContext, Toolbox};

const FALLBACK_ENCODING: &str = "utf-8";

#[derive(Debug, Clone, Default)]
pub struct SubtitleNormalization;

impl SubtitleNormalization {
    pub fn new() -> Self {
        Self
    }

    /// Whether the subtitle must be converted before synchronization.
    pub fn needs_conversion(ctx: &StageContext) -> bool {
        ctx.subtitle_format.is_sami()
            || ctx
                .encoding
                .as_deref()
                .is_some_and(|encoding| !is_utf8_compatible(encoding))
    }
}

#[async_trait]
impl PipelineStage for SubtitleNormalization {
    fn kind(&self) -> StageKind {
        StageKind::SubtitleNormalization
    }

    fn required_inputs(&self, ctx: &StageContext) -> Vec<PathBuf> {
        vec![ctx.subtitle.clone()]
    }

    fn output_path(&self, ctx: &StageContext) -> Option<PathBuf> {
        let extension = if Self::needs_conversion(ctx) {
            SubtitleFormat::Srt.extension()
        } else {
            ctx.subtitle_format.extension()
        };
        Some(ctx.work_dir().join(format!("normalized.{extension}")))
    }

    async fn execute(
        &self,
        ctx: &mut StageContext,
        tools: &Toolbox,
        sink: &dyn LogSink,
    ) -> MediaResult<String> {
        let output = self
            .output_path(ctx)
            .unwrap_or_else(|| ctx.work_dir().join("normalized.srt"));

        let message = if Self::needs_conversion(ctx) {
            let encoding = ctx.encoding.as_deref().unwrap_or(FALLBACK_ENCODING);
            let cmd = normalizer_command(&tools.paths, &ctx.subtitle, &output, encoding);
            tools.runner.run(&cmd, sink).await?;
            ensure_output(&output)?;

            let message = format!(
                "Converted {} ({}) to UTF-8 SRT",
                ctx.subtitle_format.extension(),
                encoding
            );
            ctx.subtitle_format = SubtitleFormat::Srt;
            message
        } else {
            copy_file(&ctx.subtitle, &output).await?;
            "Passthrough: subtitle already UTF-8".to_string()
        };

        ctx.subtitle = output;
        Ok(message)
    }
}
