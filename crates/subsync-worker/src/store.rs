//! Concurrency-safe job registry.
//!
//! The map lock only guards membership; each record has its own mutex so a
//! status poll on one job never waits on another job's update. Lock order is
//! always map then record, and no caller holds a record lock while taking
//! the map lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use subsync_models::{JobId, JobRecord};

use crate::error::{WorkerError, WorkerResult};

type Slot = Arc<Mutex<JobRecord>>;

/// Registry of job id to job record.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Slot>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new record and return a snapshot of it.
    pub fn create(&self, record: JobRecord) -> WorkerResult<JobRecord> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&record.id) {
            return Err(WorkerError::Duplicate(record.id));
        }
        let snapshot = record.clone();
        jobs.insert(record.id.clone(), Arc::new(Mutex::new(record)));
        Ok(snapshot)
    }

    fn slot(&self, id: &JobId) -> WorkerResult<Slot> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkerError::NotFound(id.clone()))
    }

    /// Consistent copy of one record.
    pub fn get(&self, id: &JobId) -> WorkerResult<JobRecord> {
        let slot = self.slot(id)?;
        let record = slot.lock().clone();
        Ok(record)
    }

    /// Apply `mutation` to a record atomically.
    ///
    /// Readers observe either none or all of the changes made inside the
    /// closure.
    pub fn update<F, R>(&self, id: &JobId, mutation: F) -> WorkerResult<R>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let slot = self.slot(id)?;
        let mut record = slot.lock();
        Ok(mutation(&mut record))
    }

    /// Snapshot of every record.
    pub fn list(&self) -> Vec<JobRecord> {
        let slots: Vec<Slot> = self.jobs.read().values().cloned().collect();
        slots.iter().map(|slot| slot.lock().clone()).collect()
    }

    /// Remove a record if `predicate` holds for it.
    ///
    /// The predicate is evaluated while holding both the map and record locks,
    /// so no update can slip in between the check and the removal.
    pub fn remove_if<P>(&self, id: &JobId, predicate: P) -> Option<JobRecord>
    where
        P: FnOnce(&JobRecord) -> bool,
    {
        let mut jobs = self.jobs.write();
        let slot = jobs.get(id)?.clone();
        let record = slot.lock();
        if !predicate(&record) {
            return None;
        }
        let removed = record.clone();
        drop(record);
        jobs.remove(id);
        Some(removed)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subsync_models::{JobStatus, LogLine, StreamTag};

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), "/tmp/job", "clip")
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let job = store.create(record()).unwrap();
        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let store = JobStore::new();
        let job = store.create(record()).unwrap();
        let err = store.create(job).unwrap_err();
        assert!(matches!(err, WorkerError::Duplicate(_)));
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let store = JobStore::new();
        let id = JobId::new();
        assert!(matches!(store.get(&id), Err(WorkerError::NotFound(_))));
        assert!(matches!(
            store.update(&id, |_| ()),
            Err(WorkerError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_applies_all_fields() {
        let store = JobStore::new();
        let job = store.create(record()).unwrap();

        store
            .update(&job.id, |r| {
                r.start().unwrap();
                r.advance_progress(33);
                r.push_log(LogLine::new(StreamTag::Out, "hello"));
            })
            .unwrap();

        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
        assert_eq!(fetched.progress, 33);
        assert_eq!(fetched.logs.len(), 1);
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let store = JobStore::new();
        let job = store.create(record()).unwrap();

        assert!(store.remove_if(&job.id, |r| r.is_terminal()).is_none());
        assert!(store.contains(&job.id));

        let removed = store.remove_if(&job.id, |r| !r.is_terminal()).unwrap();
        assert_eq!(removed.id, job.id);
        assert!(!store.contains(&job.id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = JobStore::new();
        let job = store.create(record()).unwrap();
        store.update(&job.id, |r| r.start().unwrap()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                let id = job.id.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store
                            .update(&id, |r| r.push_log(LogLine::new(StreamTag::Out, format!("{t}-{i}"))))
                            .unwrap();
                        let snapshot = store.get(&id).unwrap();
                        assert!(!snapshot.logs.is_empty());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get(&job.id).unwrap().logs.len(), 800);
        assert_eq!(store.list().len(), 1);
    }
}
