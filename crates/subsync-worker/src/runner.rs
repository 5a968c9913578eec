//! Drives one job through the pipeline.
//!
//! The runner is the only writer of a job record while it is Running. Every
//! transition goes through [`JobStore::update`] so a poll never observes a
//! half-applied step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{trace, warn, Instrument};

use subsync_media::{copy_file, move_file, LogSink};
use subsync_models::{
    JobError, JobId, JobRecord, LogLine, StageKind, StreamTag, SubtitleFormat, VideoFormat,
    SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS,
};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{PipelineStage, StageContext, Toolbox};
use crate::progress::ProgressReporter;
use crate::store::JobStore;

/// Suffix appended to preserved subtitles.
pub const BACKUP_SUFFIX: &str = "bk";

/// Files a job starts from.
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub subtitle_format: SubtitleFormat,
    /// Already trimmed and lower-cased
    pub encoding_override: Option<String>,
}

/// Formats accepted by pre-flight validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedFormats {
    pub video: VideoFormat,
    pub subtitle: SubtitleFormat,
}

/// Forwards tool output into the job's log sequence as it arrives.
struct JobLogSink {
    store: JobStore,
    job_id: JobId,
    stage: StageKind,
}

impl LogSink for JobLogSink {
    fn line(&self, stream: StreamTag, text: &str) {
        trace!(job_id = %self.job_id, stage = %self.stage, stream = stream.as_str(), "{}", text);
        let line = LogLine::new(stream, text).with_stage(self.stage);
        if self.store.update(&self.job_id, |r| r.push_log(line)).is_err() {
            warn!(job_id = %self.job_id, "Dropping log line for removed job");
        }
    }
}

/// Executes the stage sequence for jobs, one call per job.
#[derive(Clone)]
pub struct JobRunner {
    store: JobStore,
    toolbox: Arc<Toolbox>,
    stages: Arc<Vec<Box<dyn PipelineStage>>>,
    reporter: ProgressReporter,
}

impl JobRunner {
    pub fn with_stages(store: JobStore, toolbox: Toolbox, stages: Vec<Box<dyn PipelineStage>>) -> Self {
        let reporter = ProgressReporter::new(stages.len());
        Self {
            store,
            toolbox: Arc::new(toolbox),
            stages: Arc::new(stages),
            reporter,
        }
    }

    /// Validate upload names before anything is launched.
    ///
    /// With `force_sami` a supported subtitle is treated as SAMI whatever its
    /// extension.
    pub fn preflight(video_name: &str, subtitle_name: &str, force_sami: bool) -> Result<AcceptedFormats, JobError> {
        let video = VideoFormat::from_path(video_name).ok_or_else(|| {
            JobError::unsupported_format(format!(
                "Unsupported video file '{video_name}' (accepted: {})",
                accepted_list(VIDEO_EXTENSIONS)
            ))
        })?;

        let subtitle = SubtitleFormat::from_path(subtitle_name).ok_or_else(|| {
            JobError::unsupported_format(format!(
                "Unsupported subtitle file '{subtitle_name}' (accepted: {})",
                accepted_list(SUBTITLE_EXTENSIONS)
            ))
        })?;

        let subtitle = if force_sami { SubtitleFormat::Sami } else { subtitle };
        Ok(AcceptedFormats { video, subtitle })
    }

    /// Run every stage for `job_id`.
    ///
    /// Failures are recorded on the job, never returned.
    pub async fn run(&self, job_id: JobId, inputs: JobInputs) {
        let logger = JobLogger::new(&job_id, "subtitle_sync");
        let span = logger.create_span();
        self.run_inner(job_id, inputs, logger).instrument(span).await
    }

    async fn run_inner(&self, job_id: JobId, inputs: JobInputs, logger: JobLogger) {
        let started = self.store.update(&job_id, |r| {
            r.start().map(|_| (r.directory.clone(), r.video_basename.clone()))
        });
        let (job_dir, basename) = match started {
            Ok(Ok(started)) => started,
            Ok(Err(e)) => {
                logger.log_warning(&format!("Not starting: {e}"));
                return;
            }
            Err(e) => {
                logger.log_warning(&format!("Job vanished before start: {e}"));
                return;
            }
        };
        // A sweep may have dropped the record between lookup and start
        if !self.store.contains(&job_id) {
            logger.log_warning("Job removed before start, leaving its directory alone");
            return;
        }
        logger.log_start(&format!("{} stages", self.stages.len()));

        match backup_existing(&job_dir, &basename).await {
            Ok(backups) => {
                if !backups.is_empty() {
                    logger.log_progress(&format!("Backed up {} existing subtitle(s)", backups.len()));
                }
                let _ = self.store.update(&job_id, |r| r.backup_paths = backups);
            }
            Err(e) => {
                self.fail(&job_id, JobError::internal(format!("Backup failed: {e}")), &logger);
                return;
            }
        }

        let mut ctx = StageContext::new(
            job_id.clone(),
            &job_dir,
            inputs.video,
            inputs.subtitle,
            inputs.subtitle_format,
            inputs.encoding_override,
        );
        if let Err(e) = tokio::fs::create_dir_all(ctx.work_dir()).await {
            self.fail(&job_id, JobError::internal(format!("Cannot create work directory: {e}")), &logger);
            return;
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if !self.run_stage(stage.as_ref(), index, &mut ctx, &logger).await {
                return;
            }
        }

        let Some(aligned) = ctx.aligned.clone() else {
            self.fail(&job_id, JobError::internal("Pipeline produced no aligned subtitle"), &logger);
            return;
        };
        let final_path = job_dir.join(format!("{basename}.{}", SubtitleFormat::Srt.extension()));
        if let Err(e) = move_file(&aligned, &final_path).await {
            self.fail(&job_id, JobError::new(e.kind(), format!("Cannot publish result: {e}")), &logger);
            return;
        }

        match self.store.update(&job_id, |r| r.succeed(&final_path)) {
            Ok(Ok(())) => {
                metrics::record_job_completed();
                logger.log_completion(&final_path.display().to_string());
            }
            Ok(Err(e)) => logger.log_error(&e.to_string()),
            Err(e) => logger.log_warning(&format!("Job removed before completion: {e}")),
        }
    }

    /// Run one stage and record its events. Returns whether to continue.
    async fn run_stage(
        &self,
        stage: &dyn PipelineStage,
        index: usize,
        ctx: &mut StageContext,
        logger: &JobLogger,
    ) -> bool {
        let kind = stage.kind();
        let job_id = ctx.job_id.clone();
        let start_event = self.reporter.stage_started(kind);
        let label = stage.label();
        if self
            .store
            .update(&job_id, |r| {
                r.push_event(start_event);
                r.current_step = label.to_string();
            })
            .is_err()
        {
            return false;
        }
        logger.log_stage(kind, label);

        let sink = JobLogSink {
            store: self.store.clone(),
            job_id: job_id.clone(),
            stage: kind,
        };
        let started = Instant::now();
        let result = match stage.validate(ctx) {
            Ok(()) => stage.execute(ctx, &self.toolbox, &sink).await,
            Err(e) => Err(e),
        };
        metrics::record_stage_duration(kind, started.elapsed().as_secs_f64());

        match result {
            Ok(message) => {
                logger.log_stage(kind, &message);
                let event = self.reporter.stage_succeeded(kind, message);
                let progress = self.reporter.percent(index + 1);
                let encoding = ctx.encoding.clone();
                self.store
                    .update(&job_id, |r| {
                        r.push_event(event);
                        r.advance_progress(progress);
                        if r.encoding.is_none() {
                            r.encoding = encoding;
                        }
                    })
                    .is_ok()
            }
            Err(e) => {
                let error = JobError::new(e.kind(), e.to_string())
                    .with_stage(kind)
                    .with_stderr_tail(e.stderr_tail().to_vec());
                let event = self.reporter.stage_failed(kind, &error);
                let _ = self.store.update(&job_id, |r| r.push_event(event));
                self.fail(&job_id, error, logger);
                false
            }
        }
    }

    fn fail(&self, job_id: &JobId, error: JobError, logger: &JobLogger) {
        logger.log_error(&error.to_string());
        let kind = error.kind;
        match self.store.update(job_id, |r| r.fail(error)) {
            Ok(Ok(())) => metrics::record_job_failed(kind),
            Ok(Err(e)) => logger.log_error(&e.to_string()),
            Err(_) => {}
        }
    }

    /// Record an immediate pre-flight failure on a Pending job.
    pub fn reject(store: &JobStore, job_id: &JobId, error: JobError) -> WorkerResult<JobRecord> {
        let kind = error.kind;
        store.update(job_id, |r| r.fail(error))??;
        metrics::record_job_failed(kind);
        store.get(job_id)
    }
}

fn accepted_list(extensions: &[&str]) -> String {
    extensions.join(", ")
}

/// Copy every subtitle named `<basename>.<subtitle ext>` to `<name>.bk`.
///
/// Returned paths are sorted by file name.
pub async fn backup_existing(job_dir: &Path, basename: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut backups = Vec::new();
    for extension in SUBTITLE_EXTENSIONS {
        let original = job_dir.join(format!("{basename}.{extension}"));
        if !tokio::fs::try_exists(&original).await? {
            continue;
        }
        let backup = job_dir.join(format!("{basename}.{extension}.{BACKUP_SUFFIX}"));
        copy_file(&original, &backup)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        backups.push(backup);
    }
    backups.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(backups)
}
