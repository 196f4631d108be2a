use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::analysis::AnalysisResult;
use crate::models::job::AnalysisJob;
use crate::pipeline::notifier::CompletionEvent;
use crate::pipeline::retry::RetryError;
use crate::pipeline::PipelineInner;
use crate::services::validation;

/// Distinguished failure message for jobs resolved by shutdown/cancellation.
pub const CANCELLED_MESSAGE: &str = "analysis was cancelled";

/// Single-consumer worker loop.
///
/// Processes strictly one job at a time. Every failure inside a job's
/// processing pass resolves that job as `Failed`; only queue closure or
/// shutdown ends the loop itself.
pub(crate) async fn run(
    mut rx: mpsc::UnboundedReceiver<AnalysisJob>,
    inner: Arc<PipelineInner>,
    cancel: CancellationToken,
) {
    tracing::info!("analysis worker started");
    inner.set_processing(true);

    loop {
        let job = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(job) => job,
                // Queue closed and fully drained.
                None => break,
            },
            _ = cancel.cancelled() => {
                drain_cancelled(&mut rx, &inner);
                break;
            }
        };

        if cancel.is_cancelled() {
            resolve_cancelled(&inner, &job);
            continue;
        }

        // Run the pass in its own task so a panic in an analyzer or
        // resolver implementation is contained to this job.
        let pass = {
            let inner = Arc::clone(&inner);
            let job = job.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { process_job(&inner, &job, &cancel).await })
        };

        if let Err(e) = pass.await {
            tracing::error!(job_id = %job.id, error = %e, "job processing pass panicked");
            let message = format!("internal processing error: {e}");
            inner.tracker.mark_failed(job.id, &message);
            inner.notifier.notify(&CompletionEvent {
                subject_id: job.subject_id,
                result: AnalysisResult::failure(message),
                success: false,
            });
        }

        inner.note_processed();
        metrics::gauge!("analysis_queue_depth").set(inner.tracker.counts().0 as f64);
    }

    inner.set_processing(false);
    tracing::info!("analysis worker stopped");
}

/// Resolve jobs still buffered at shutdown so none is silently dropped.
fn drain_cancelled(rx: &mut mpsc::UnboundedReceiver<AnalysisJob>, inner: &PipelineInner) {
    while let Ok(job) = rx.try_recv() {
        resolve_cancelled(inner, &job);
    }
}

fn resolve_cancelled(inner: &PipelineInner, job: &AnalysisJob) {
    tracing::debug!(job_id = %job.id, "resolving job as cancelled during shutdown");
    inner.tracker.mark_failed(job.id, CANCELLED_MESSAGE);
    inner.notifier.notify(&CompletionEvent {
        subject_id: job.subject_id,
        result: AnalysisResult::failure(CANCELLED_MESSAGE),
        success: false,
    });
    inner.note_processed();
}

/// One processing pass for a dequeued job.
async fn process_job(inner: &PipelineInner, job: &AnalysisJob, cancel: &CancellationToken) {
    tracing::debug!(
        job_id = %job.id,
        subject_id = %job.subject_id,
        source_ref = %job.source_ref,
        "processing analysis job"
    );

    inner.tracker.mark_processing(job.id);
    let started = std::time::Instant::now();

    match analyze_source(inner, job, cancel).await {
        Ok(mut result) => {
            result.processing_time_ms = started.elapsed().as_millis() as u64;
            inner.results.store(job.subject_id, result.clone());
            inner.tracker.mark_completed(job.id);

            metrics::counter!("analysis_jobs_completed").increment(1);
            metrics::histogram!("analysis_processing_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::info!(
                job_id = %job.id,
                subject_id = %job.subject_id,
                caption = result.main_caption.as_deref().unwrap_or(""),
                "analysis completed"
            );

            inner.notifier.notify(&CompletionEvent {
                subject_id: job.subject_id,
                result,
                success: true,
            });
        }
        Err(message) => {
            inner.tracker.mark_failed(job.id, &message);

            metrics::counter!("analysis_jobs_failed").increment(1);
            tracing::warn!(
                job_id = %job.id,
                subject_id = %job.subject_id,
                error = %message,
                "analysis failed"
            );

            inner.notifier.notify(&CompletionEvent {
                subject_id: job.subject_id,
                result: AnalysisResult::failure(message),
                success: false,
            });
        }
    }
}

/// Resolve, validate, and analyze a job's source. Returns the failure
/// message for any unsuccessful path; validation failures never reach the
/// external capability.
async fn analyze_source(
    inner: &PipelineInner,
    job: &AnalysisJob,
    cancel: &CancellationToken,
) -> Result<AnalysisResult, String> {
    let bytes = inner
        .resolver
        .resolve(&job.source_ref)
        .await
        .map_err(|e| format!("failed to read image source: {e}"))?;

    validation::validate_image(&bytes, inner.options.max_input_size_bytes)
        .map_err(|e| format!("image validation failed: {e}"))?;

    match inner
        .retry
        .run(cancel, |_| inner.analyzer.analyze(&bytes, cancel))
        .await
    {
        Ok(result) => Ok(result),
        Err(RetryError::Cancelled) => Err(CANCELLED_MESSAGE.to_string()),
        Err(error) => Err(error.to_string()),
    }
}
