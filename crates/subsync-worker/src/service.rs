//! Service facade used by the HTTP layer.
//!
//! Owns the store, the runner, the packager and the cleaner, and turns a
//! submission into a job directory plus a spawned runner task. Submission
//! never waits for the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use subsync_media::{move_file, remove_dir_idempotent, ToolRunner};
use subsync_models::{JobId, JobRecord, JobStatus, SubtitleFormat};

use crate::cleaner::{Cleaner, SweepReport};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::packager::{BackupArchive, ResultFile, ResultPackager};
use crate::pipeline::{default_pipeline, PipelineStage, Toolbox};
use crate::progress::StatusSnapshot;
use crate::runner::{JobInputs, JobRunner};
use crate::store::JobStore;

/// An upload already written to the staging area.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    /// Filename as sent by the client
    pub original_name: String,
    /// Where the bytes currently live
    pub path: PathBuf,
}

impl StagedUpload {
    pub fn new(original_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            original_name: original_name.into(),
            path: path.into(),
        }
    }
}

/// Inputs of one job.
#[derive(Debug, Clone)]
pub struct Submission {
    pub video: StagedUpload,
    pub subtitle: StagedUpload,
    pub encoding_override: Option<String>,
    pub force_sami: bool,
}

/// Returned immediately by [`SubsyncService::submit`].
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Job orchestration service.
#[derive(Clone)]
pub struct SubsyncService {
    config: WorkerConfig,
    store: JobStore,
    runner: JobRunner,
    cleaner: Cleaner,
    packager: ResultPackager,
    job_semaphore: Arc<Semaphore>,
}

impl SubsyncService {
    pub fn new(config: WorkerConfig) -> Self {
        Self::with_stages(config, default_pipeline())
    }

    /// Build the service around a custom stage list.
    pub fn with_stages(config: WorkerConfig, stages: Vec<Box<dyn PipelineStage>>) -> Self {
        let store = JobStore::new();
        let runner = match config.tool_timeout {
            Some(timeout) => ToolRunner::new().with_timeout(timeout),
            None => ToolRunner::new(),
        };
        let toolbox = Toolbox::new(runner, config.tools.clone());
        let cleaner = Cleaner::new(store.clone(), &config);

        Self {
            runner: JobRunner::with_stages(store.clone(), toolbox, stages),
            job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            packager: ResultPackager::new(),
            cleaner,
            store,
            config,
        }
    }

    /// Create the base and staging directories.
    pub async fn prepare(&self) -> WorkerResult<()> {
        tokio::fs::create_dir_all(&self.config.base_dir).await?;
        tokio::fs::create_dir_all(self.config.incoming_dir()).await?;
        Ok(())
    }

    /// Accept a job and start it in the background.
    ///
    /// Unsupported formats still produce a job, already Failed, so the caller
    /// can read the reason from the status endpoint.
    pub async fn submit(&self, submission: Submission) -> WorkerResult<SubmitReceipt> {
        self.cleaner.sweep(Utc::now()).await;

        let job_id = JobId::new();
        let job_dir = self.config.base_dir.join(job_id.as_str());
        let video_basename = sanitize_basename(&submission.video.original_name);
        tokio::fs::create_dir_all(&job_dir).await?;
        metrics::record_job_submitted();

        let formats = match JobRunner::preflight(
            &submission.video.original_name,
            &submission.subtitle.original_name,
            submission.force_sami,
        ) {
            Ok(formats) => formats,
            Err(job_error) => {
                discard(&submission.video.path).await;
                discard(&submission.subtitle.path).await;
                self.store
                    .create(JobRecord::new(job_id.clone(), &job_dir, video_basename))?;
                let record = JobRunner::reject(&self.store, &job_id, job_error)?;
                info!(job_id = %job_id, "Rejected submission: {:?}", record.error);
                return Ok(SubmitReceipt {
                    job_id,
                    status: record.status,
                });
            }
        };

        let video_path = job_dir.join(format!("original_video.{}", formats.video.extension()));
        let subtitle_name = subtitle_filename(&submission.subtitle.original_name, formats.subtitle);
        let subtitle_path = job_dir.join(subtitle_name);

        let placed = async {
            move_file(&submission.video.path, &video_path).await?;
            move_file(&submission.subtitle.path, &subtitle_path).await?;
            Ok::<(), WorkerError>(())
        }
        .await;
        if let Err(e) = placed {
            let _ = remove_dir_idempotent(&job_dir).await;
            discard(&submission.video.path).await;
            discard(&submission.subtitle.path).await;
            return Err(e);
        }

        let mut record = JobRecord::new(job_id.clone(), &job_dir, video_basename);
        record.enqueue();
        self.store.create(record)?;
        info!(job_id = %job_id, "Job accepted");

        let inputs = JobInputs {
            video: video_path,
            subtitle: subtitle_path,
            subtitle_format: formats.subtitle,
            encoding_override: normalize_override(submission.encoding_override.as_deref()),
        };
        self.spawn_job(job_id.clone(), inputs);

        Ok(SubmitReceipt {
            job_id,
            status: JobStatus::Pending,
        })
    }

    fn spawn_job(&self, job_id: JobId, inputs: JobInputs) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let store = self.store.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        tokio::spawn(async move {
            // Queued jobs stay Pending until a slot frees up.
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job_id, "Job semaphore closed, job not started");
                    // Nothing will start it now, so let the TTL reclaim it
                    let _ = store.update(&job_id, |r| r.dequeue());
                    return;
                }
            };
            runner.run(job_id, inputs).await;
        })
    }

    /// Full-history snapshot of a job.
    pub fn status(&self, job_id: &JobId) -> WorkerResult<StatusSnapshot> {
        self.store.get(job_id).map(StatusSnapshot::from)
    }

    pub fn record(&self, job_id: &JobId) -> WorkerResult<JobRecord> {
        self.store.get(job_id)
    }

    /// The aligned subtitle of a succeeded job.
    pub fn result(&self, job_id: &JobId) -> WorkerResult<ResultFile> {
        let record = self.store.get(job_id)?;
        self.packager.subtitle(&record)
    }

    /// The backup archive of a succeeded job that had backups.
    pub async fn backup_archive(&self, job_id: &JobId) -> WorkerResult<BackupArchive> {
        let record = self.store.get(job_id)?;
        let packager = self.packager;
        tokio::task::spawn_blocking(move || packager.backup_archive(&record))
            .await
            .map_err(|e| WorkerError::Io(std::io::Error::other(e)))?
    }

    /// Run one sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.cleaner.sweep(Utc::now()).await
    }

    /// Start the periodic cleaner; its first tick is the startup sweep.
    pub fn spawn_cleaner(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let cleaner = self.cleaner.clone();
        let every = self.config.sweep_interval;
        tokio::spawn(async move { cleaner.run(every, shutdown).await })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to discard staged upload {}: {}", path.display(), e);
        }
    }
}

/// Trim and lower-case an encoding override; blank means absent.
pub fn normalize_override(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

/// Reduce a client filename to a safe single path component.
///
/// Directory parts are dropped, unusual characters become `_` and leading
/// dots are removed so the result can never be hidden or escape the job
/// directory.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Base name used for the result file, from the video's filename.
pub fn sanitize_basename(video_name: &str) -> String {
    let file = sanitize_filename(video_name, "video");
    Path::new(&file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "video".to_string())
}

/// Name the uploaded subtitle is stored under.
///
/// A subtitle forced to SAMI gets the `.smi` extension.
fn subtitle_filename(original_name: &str, format: SubtitleFormat) -> String {
    let name = sanitize_filename(original_name, "subtitle");
    let current = SubtitleFormat::from_path(&name);
    if current == Some(format) {
        return name;
    }
    let stem = Path::new(&name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "subtitle".to_string());
    format!("{stem}.{}", format.extension())
}
