//! Downloadable artifacts of a succeeded job.
//!
//! The backup archive is built in memory and is reproducible: entries are
//! sorted by file name and carry fixed timestamps and permissions, so two
//! builds from the same record are byte-identical.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use subsync_models::{JobRecord, JobStatus};

use crate::error::{WorkerError, WorkerResult};

/// A file to hand to the caller under a download name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    pub path: PathBuf,
    pub filename: String,
}

/// In-memory backup archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Assembles results from a job record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPackager;

impl ResultPackager {
    pub fn new() -> Self {
        Self
    }

    /// The aligned subtitle, named after the video.
    pub fn subtitle(&self, record: &JobRecord) -> WorkerResult<ResultFile> {
        ensure_succeeded(record)?;
        let path = record.result_path.clone().ok_or_else(|| WorkerError::ResultUnavailable {
            id: record.id.clone(),
            status: record.status,
        })?;
        if !path.exists() {
            return Err(WorkerError::NotFound(record.id.clone()));
        }
        Ok(ResultFile {
            path,
            filename: format!("{}.srt", record.video_basename),
        })
    }

    /// Zip of every backed-up subtitle.
    ///
    /// Blocking; call from a blocking-capable thread.
    pub fn backup_archive(&self, record: &JobRecord) -> WorkerResult<BackupArchive> {
        ensure_succeeded(record)?;
        if record.backup_paths.is_empty() {
            return Err(WorkerError::NoBackups(record.id.clone()));
        }
        Ok(BackupArchive {
            filename: format!("{}_backups.zip", record.video_basename),
            bytes: build_archive(&record.backup_paths)?,
        })
    }
}

fn ensure_succeeded(record: &JobRecord) -> WorkerResult<()> {
    if record.status == JobStatus::Succeeded {
        Ok(())
    } else {
        Err(WorkerError::ResultUnavailable {
            id: record.id.clone(),
            status: record.status,
        })
    }
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Deterministic deflate zip of `paths`, ordered by file name.
pub fn build_archive(paths: &[PathBuf]) -> WorkerResult<Vec<u8>> {
    let mut entries: Vec<(String, &PathBuf)> = paths.iter().map(|p| (entry_name(p), p)).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.dedup_by(|a, b| a.0 == b.0);

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, path) in entries {
        let data = std::fs::read(path)?;
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&data)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use subsync_models::{JobError, JobId};
    use tempfile::TempDir;

    fn succeeded(dir: &Path, backups: Vec<PathBuf>) -> JobRecord {
        let result = dir.join("movie.srt");
        std::fs::write(&result, "aligned").unwrap();
        let mut record = JobRecord::new(JobId::new(), dir, "movie");
        record.start().unwrap();
        record.backup_paths = backups;
        record.succeed(&result).unwrap();
        record
    }

    #[test]
    fn test_subtitle_download_name() {
        let dir = TempDir::new().unwrap();
        let record = succeeded(dir.path(), vec![]);
        let file = ResultPackager::new().subtitle(&record).unwrap();
        assert_eq!(file.filename, "movie.srt");
        assert_eq!(file.path, dir.path().join("movie.srt"));
    }

    #[test]
    fn test_results_unavailable_until_succeeded() {
        let mut record = JobRecord::new(JobId::new(), "/tmp/x", "movie");
        let packager = ResultPackager::new();
        assert!(matches!(
            packager.subtitle(&record),
            Err(WorkerError::ResultUnavailable { .. })
        ));

        record.fail(JobError::internal("x")).unwrap();
        assert!(matches!(
            packager.backup_archive(&record),
            Err(WorkerError::ResultUnavailable { .. })
        ));
    }

    #[test]
    fn test_no_backups_means_no_archive() {
        let dir = TempDir::new().unwrap();
        let record = succeeded(dir.path(), vec![]);
        assert!(matches!(
            ResultPackager::new().backup_archive(&record),
            Err(WorkerError::NoBackups(_))
        ));
    }

    #[test]
    fn test_archive_is_sorted_and_reproducible() {
        let dir = TempDir::new().unwrap();
        let srt = dir.path().join("movie.srt.bk");
        let smi = dir.path().join("movie.smi.bk");
        std::fs::write(&srt, "old srt").unwrap();
        std::fs::write(&smi, "old smi").unwrap();

        // Deliberately unsorted.
        let record = succeeded(dir.path(), vec![srt.clone(), smi.clone()]);
        let packager = ResultPackager::new();
        let first = packager.backup_archive(&record).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = packager.backup_archive(&record).unwrap();

        assert_eq!(first.filename, "movie_backups.zip");
        assert_eq!(first.bytes, second.bytes);

        let mut archive = zip::ZipArchive::new(Cursor::new(first.bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let mut by_index = Vec::new();
        for i in 0..archive.len() {
            by_index.push(archive.by_index(i).unwrap().name().to_string());
        }
        assert_eq!(by_index, vec!["movie.smi.bk", "movie.srt.bk"]);
        assert_eq!(names.len(), 2);

        let mut content = String::new();
        archive
            .by_name("movie.srt.bk")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "old srt");
    }
}
