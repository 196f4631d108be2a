use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an analysis job in the async pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// One request to analyze a single screenshot.
///
/// Jobs are created by producers, mutated only by the worker loop (through
/// the tracker), and retained for status querying. Status transitions are
/// monotonic: `Queued → Processing → {Completed, Failed}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    /// The screenshot this job's result is associated with.
    pub subject_id: Uuid,
    /// Opaque reference to the image bytes (storage key or path).
    pub source_ref: String,
    pub queued_at: DateTime<Utc>,
    /// Incremented exactly once per transition into `Processing`.
    pub attempt_count: u32,
    pub status: JobStatus,
    /// Set only when the job fails.
    pub error_message: Option<String>,
    /// Set when the job reaches a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new(subject_id: Uuid, source_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            source_ref: source_ref.into(),
            queued_at: Utc::now(),
            attempt_count: 0,
            status: JobStatus::Queued,
            error_message: None,
            processed_at: None,
        }
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.attempt_count += 1;
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.processed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.into());
        self.processed_at = Some(Utc::now());
    }

    /// Whether this job may be re-submitted through the explicit retry
    /// operation. Never consulted by the worker loop itself.
    pub fn eligible_for_retry(&self, max_attempts: u32) -> bool {
        self.status == JobStatus::Failed && self.attempt_count < max_attempts
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Point-in-time view of the pipeline computed from tracked jobs.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Whether the worker loop is currently running.
    pub is_processing: bool,
    /// When the worker last resolved a job.
    pub last_processed_at: Option<DateTime<Utc>>,
}
