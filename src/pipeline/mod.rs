//! Asynchronous analysis pipeline: job queue, tracker, retry policy,
//! single-consumer worker, result store, and completion fan-out.

pub mod notifier;
pub mod queue;
pub mod retry;
pub mod tracker;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::job::{AnalysisJob, QueueStatus};
use crate::pipeline::notifier::{CompletionEvent, CompletionNotifier, ObserverId};
use crate::pipeline::queue::{JobQueue, QueueError};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::tracker::{JobTracker, ResultStore};
use crate::services::storage::SourceResolver;
use crate::services::vision::VisionAnalyzer;

pub use worker::CANCELLED_MESSAGE;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound on external analysis calls per job pass. Must be >= 0;
    /// 0 fails every job without calling the capability.
    pub max_retry_attempts: u32,
    /// Base delay for linear backoff between attempts.
    pub retry_base_delay: Duration,
    /// Inputs larger than this fail validation before any analysis call.
    pub max_input_size_bytes: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            max_input_size_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Worker-maintained liveness state, read by the status aggregator.
#[derive(Debug, Default)]
struct WorkerState {
    is_processing: bool,
    last_processed_at: Option<DateTime<Utc>>,
}

/// Shared core state: everything the worker loop and the public surface
/// both touch. Owned per pipeline instance, never process-global.
pub(crate) struct PipelineInner {
    pub(crate) queue: JobQueue,
    pub(crate) tracker: JobTracker,
    pub(crate) results: ResultStore,
    pub(crate) notifier: CompletionNotifier,
    pub(crate) retry: RetryPolicy,
    pub(crate) analyzer: Arc<dyn VisionAnalyzer>,
    pub(crate) resolver: Arc<dyn SourceResolver>,
    pub(crate) options: PipelineOptions,
    worker_state: Mutex<WorkerState>,
}

impl PipelineInner {
    pub(crate) fn set_processing(&self, active: bool) {
        self.worker_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_processing = active;
    }

    pub(crate) fn note_processed(&self) {
        self.worker_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_processed_at = Some(Utc::now());
    }

    fn worker_state(&self) -> (bool, Option<DateTime<Utc>>) {
        let state = self
            .worker_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (state.is_processing, state.last_processed_at)
    }
}

/// The analysis pipeline's public surface.
///
/// Producers enqueue jobs from any task; a single background worker
/// consumes them in FIFO order, calls the vision capability through the
/// retry policy, records outcomes, and fans completions out to observers.
pub struct AnalysisPipeline {
    inner: Arc<PipelineInner>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisPipeline {
    pub fn new(
        options: PipelineOptions,
        analyzer: Arc<dyn VisionAnalyzer>,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        let retry = RetryPolicy::new(options.max_retry_attempts, options.retry_base_delay);
        Self {
            inner: Arc::new(PipelineInner {
                queue: JobQueue::new(),
                tracker: JobTracker::new(),
                results: ResultStore::new(),
                notifier: CompletionNotifier::new(),
                retry,
                analyzer,
                resolver,
                options,
                worker_state: Mutex::new(WorkerState::default()),
            }),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Submit a screenshot for analysis. Never blocks; fails only when the
    /// pipeline has been stopped.
    pub fn enqueue(
        &self,
        subject_id: Uuid,
        source_ref: impl Into<String>,
    ) -> Result<AnalysisJob, QueueError> {
        let job = AnalysisJob::new(subject_id, source_ref);
        self.inner.tracker.register(&job);

        if let Err(e) = self.inner.queue.push(job.clone()) {
            // Rejected jobs must not linger as phantom Queued entries.
            self.inner.tracker.remove(job.id);
            return Err(e);
        }

        metrics::counter!("analysis_jobs_total").increment(1);
        metrics::gauge!("analysis_queue_depth").set(self.inner.tracker.counts().0 as f64);
        tracing::debug!(
            job_id = %job.id,
            subject_id = %subject_id,
            source_ref = %job.source_ref,
            "queued analysis job"
        );
        Ok(job)
    }

    /// Spawn the background worker. Idempotent: later calls are no-ops.
    pub fn start(&self) {
        let Some(rx) = self.inner.queue.take_receiver() else {
            tracing::debug!("analysis pipeline already started");
            return;
        };

        let handle = tokio::spawn(worker::run(
            rx,
            Arc::clone(&self.inner),
            self.cancel.clone(),
        ));
        *self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!("analysis pipeline started");
    }

    /// Close the queue to new jobs, signal shutdown, and wait for the
    /// worker to settle. Idempotent. The in-flight job resolves (observing
    /// cancellation during retry waits); jobs still buffered resolve as
    /// failed-cancelled. A stopped pipeline cannot be restarted.
    pub async fn stop(&self) {
        self.inner.queue.close();
        self.cancel.cancel();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            tracing::info!("stopping analysis pipeline");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "analysis worker terminated abnormally");
            }
        }
        tracing::info!("analysis pipeline stopped");
    }

    /// Counts per status plus worker liveness, computed from a tracker
    /// snapshot on demand.
    pub fn queue_status(&self) -> QueueStatus {
        let (queued, processing, completed, failed) = self.inner.tracker.counts();
        let (is_processing, last_processed_at) = self.inner.worker_state();
        QueueStatus {
            queued,
            processing,
            completed,
            failed,
            is_processing,
            last_processed_at,
        }
    }

    pub fn job(&self, id: Uuid) -> Option<AnalysisJob> {
        self.inner.tracker.get(id)
    }

    /// Snapshot of every tracked job, newest first.
    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.inner.tracker.snapshot()
    }

    pub fn result_for(&self, subject_id: Uuid) -> Option<AnalysisResult> {
        self.inner.results.get(subject_id)
    }

    pub fn all_completed_results(&self) -> Vec<(Uuid, AnalysisResult)> {
        self.inner.results.all()
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CompletionEvent) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    /// Explicitly re-submit a failed job as a fresh job for the same
    /// subject and source. The failed job itself stays failed; the worker
    /// never invokes this on its own.
    pub fn retry_failed(&self, job_id: Uuid) -> Result<AnalysisJob, PipelineError> {
        let job = self
            .inner
            .tracker
            .get(job_id)
            .ok_or(PipelineError::UnknownJob(job_id))?;

        if !job.eligible_for_retry(self.inner.options.max_retry_attempts) {
            return Err(PipelineError::NotEligible(job_id));
        }

        tracing::info!(job_id = %job_id, subject_id = %job.subject_id, "re-submitting failed job");
        Ok(self.enqueue(job.subject_id, job.source_ref)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown analysis job: {0}")]
    UnknownJob(Uuid),

    #[error("job {0} is not eligible for retry")]
    NotEligible(Uuid),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
