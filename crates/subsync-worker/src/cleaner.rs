//! Time-based reclamation of job storage.
//!
//! Eligibility is checked and the record removed in one step under the store
//! lock, then the directory is deleted. Running and queued jobs are never
//! eligible, so a sweep can never pull a directory out from under a runner.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use subsync_media::remove_dir_idempotent;
use subsync_models::JobId;

use crate::config::WorkerConfig;
use crate::metrics;
use crate::store::JobStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records removed because their TTL elapsed
    pub expired: Vec<JobId>,
    /// Directories without a record that were removed
    pub orphans: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.orphans.is_empty()
    }
}

/// Deletes expired jobs and leftover directories.
#[derive(Debug, Clone)]
pub struct Cleaner {
    store: JobStore,
    base_dir: PathBuf,
    /// Orphan directory age limit
    ttl: Duration,
    /// Same limit, for record timestamps
    record_ttl: chrono::Duration,
}

impl Cleaner {
    pub fn new(store: JobStore, config: &WorkerConfig) -> Self {
        Self {
            store,
            base_dir: config.base_dir.clone(),
            ttl: config.job_ttl,
            record_ttl: config.ttl(),
        }
    }

    /// Reclaim every eligible job as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let ttl = self.record_ttl;
        let mut report = SweepReport::default();

        for record in self.store.list() {
            if !record.is_expired(now, ttl) {
                continue;
            }
            // Re-check under the lock; the snapshot may be stale.
            let Some(removed) = self.store.remove_if(&record.id, |r| r.is_expired(now, ttl)) else {
                continue;
            };
            match remove_dir_idempotent(&removed.directory).await {
                Ok(_) => debug!(job_id = %removed.id, "Reclaimed job directory"),
                Err(e) => warn!(
                    job_id = %removed.id,
                    "Failed to delete job directory {}: {}",
                    removed.directory.display(),
                    e
                ),
            }
            report.expired.push(removed.id);
        }

        match self.sweep_orphans(SystemTime::from(now)).await {
            Ok(orphans) => report.orphans = orphans,
            Err(e) => warn!("Orphan sweep of {} failed: {}", self.base_dir.display(), e),
        }

        metrics::record_jobs_swept(report.expired.len());
        if !report.is_empty() {
            info!(
                "Cleaner swept {} expired job(s), {} orphan directorie(s)",
                report.expired.len(),
                report.orphans.len()
            );
        }
        report
    }

    /// Remove directories under the base path that no record owns and that
    /// have not been touched for a full TTL. Dot-directories are skipped.
    async fn sweep_orphans(&self, now: SystemTime) -> std::io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || self.store.contains(&JobId::from(name.as_str())) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() || !self.is_stale(&metadata, now) {
                continue;
            }
            let path = entry.path();
            if remove_dir_idempotent(&path).await.unwrap_or(false) {
                debug!("Removed orphan job directory {}", path.display());
                removed.push(path);
            }
        }
        Ok(removed)
    }

    fn is_stale(&self, metadata: &std::fs::Metadata, now: SystemTime) -> bool {
        metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age >= self.ttl)
    }

    /// Sweep on every tick of `every` until `shutdown` flips to true.
    ///
    /// The first tick fires immediately, which doubles as the startup sweep.
    pub async fn run(&self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting cleaner (interval: {:?}, ttl: {:?}, base: {})",
            every,
            self.ttl,
            self.base_dir.display()
        );
        let mut ticker = interval(every);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cleaner stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep(Utc::now()).await;
                }
            }
        }
    }
}
