use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::job::{AnalysisJob, JobStatus};

/// In-memory registry of every job this pipeline instance has accepted.
///
/// Jobs are inserted by producers and mutated only by the worker loop; all
/// reads return cloned snapshots, so readers never observe a job mid-update.
/// Entries are retained for the lifetime of the pipeline.
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, AnalysisJob>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, AnalysisJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, job: &AnalysisJob) {
        self.write().insert(job.id, job.clone());
    }

    pub(crate) fn remove(&self, id: Uuid) {
        self.write().remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<AnalysisJob> {
        self.read().get(&id).cloned()
    }

    /// All tracked jobs, newest first.
    pub fn snapshot(&self) -> Vec<AnalysisJob> {
        let mut jobs: Vec<AnalysisJob> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }

    /// Counts per status: (queued, processing, completed, failed).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let jobs = self.read();
        let mut queued = 0;
        let mut processing = 0;
        let mut completed = 0;
        let mut failed = 0;
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => queued += 1,
                JobStatus::Processing => processing += 1,
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
            }
        }
        (queued, processing, completed, failed)
    }

    /// Transition a job into `Processing`, bumping its attempt counter.
    /// All fields change under one write-lock hold.
    pub(crate) fn mark_processing(&self, id: Uuid) {
        if let Some(job) = self.write().get_mut(&id) {
            job.mark_processing();
        }
    }

    pub(crate) fn mark_completed(&self, id: Uuid) {
        if let Some(job) = self.write().get_mut(&id) {
            job.mark_completed();
        }
    }

    pub(crate) fn mark_failed(&self, id: Uuid, error_message: &str) {
        if let Some(job) = self.write().get_mut(&id) {
            job.mark_failed(error_message);
        }
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed analysis results keyed by subject.
///
/// Last successful write wins; a failed job never evicts an earlier
/// successful result for the same subject.
pub struct ResultStore {
    results: RwLock<HashMap<Uuid, AnalysisResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn store(&self, subject_id: Uuid, result: AnalysisResult) {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject_id, result);
    }

    pub fn get(&self, subject_id: Uuid) -> Option<AnalysisResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&subject_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<(Uuid, AnalysisResult)> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(subject_id, result)| (*subject_id, result.clone()))
            .collect()
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> AnalysisJob {
        AnalysisJob::new(Uuid::new_v4(), "shots/test.png")
    }

    #[test]
    fn test_register_and_get() {
        let tracker = JobTracker::new();
        let j = job();
        tracker.register(&j);

        let fetched = tracker.get(j.id).unwrap();
        assert_eq!(fetched.id, j.id);
        assert_eq!(fetched.status, JobStatus::Queued);
        assert!(tracker.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let tracker = JobTracker::new();
        let j = job();
        tracker.register(&j);

        let before = tracker.get(j.id).unwrap();
        tracker.mark_processing(j.id);

        // The earlier snapshot is unaffected; a fresh read sees the change.
        assert_eq!(before.status, JobStatus::Queued);
        assert_eq!(tracker.get(j.id).unwrap().status, JobStatus::Processing);
        assert_eq!(tracker.get(j.id).unwrap().attempt_count, 1);
    }

    #[test]
    fn test_mark_failed_updates_all_fields_together() {
        let tracker = JobTracker::new();
        let j = job();
        tracker.register(&j);
        tracker.mark_processing(j.id);
        tracker.mark_failed(j.id, "no route to host");

        let failed = tracker.get(j.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("no route to host"));
        assert!(failed.processed_at.is_some());
    }

    #[test]
    fn test_counts_by_status() {
        let tracker = JobTracker::new();
        let queued = job();
        let processing = job();
        let done = job();
        tracker.register(&queued);
        tracker.register(&processing);
        tracker.register(&done);

        tracker.mark_processing(processing.id);
        tracker.mark_processing(done.id);
        tracker.mark_completed(done.id);

        assert_eq!(tracker.counts(), (1, 1, 1, 0));
    }

    #[test]
    fn test_result_store_last_write_wins() {
        let store = ResultStore::new();
        let subject = Uuid::new_v4();

        let mut first = AnalysisResult::empty_success();
        first.main_caption = Some("first".to_string());
        store.store(subject, first);

        let mut second = AnalysisResult::empty_success();
        second.main_caption = Some("second".to_string());
        store.store(subject, second);

        let stored = store.get(subject).unwrap();
        assert_eq!(stored.main_caption.as_deref(), Some("second"));
        assert_eq!(store.all().len(), 1);
    }
}
