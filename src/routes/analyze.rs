use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::analysis::AnalysisResult;
use crate::models::job::{AnalysisJob, JobStatus, QueueStatus};
use crate::services::validation::{self, ValidationError};

/// Response after submitting a screenshot for analysis.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub subject_id: Uuid,
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Response for querying an analysis job.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: AnalysisJob,
    /// Stored result for the job's subject, if analysis has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisEntry {
    pub subject_id: Uuid,
    pub result: AnalysisResult,
}

/// POST /api/v1/screenshots — upload a screenshot and queue it for analysis.
pub async fn submit_screenshot(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let mut image_data: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("image") {
            let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            image_data = Some(data);
        }
    }

    let data = image_data.ok_or(StatusCode::BAD_REQUEST)?;
    let format = validation::validate_image(&data, state.config.max_input_size_bytes).map_err(
        |e| match e {
            ValidationError::Empty => StatusCode::BAD_REQUEST,
            ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::UnknownFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        },
    )?;

    let subject_id = Uuid::new_v4();
    let source_ref = state
        .store
        .save(subject_id, &data, format)
        .await
        .map_err(|e| {
            tracing::error!(subject_id = %subject_id, error = %e, "failed to store screenshot");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let job = state
        .pipeline
        .enqueue(subject_id, source_ref)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(SubmitResponse {
        subject_id,
        job_id: job.id,
        status: job.status,
    }))
}

/// GET /api/v1/jobs/{job_id} — analysis job status, with the stored result
/// once its subject has one.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = state.pipeline.job(job_id).ok_or(StatusCode::NOT_FOUND)?;
    let result = match job.status {
        JobStatus::Completed => state.pipeline.result_for(job.subject_id),
        _ => None,
    };
    Ok(Json(JobResponse { job, result }))
}

/// GET /api/v1/screenshots/{subject_id}/analysis — stored analysis result.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<AnalysisResult>, StatusCode> {
    state
        .pipeline
        .result_for(subject_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/v1/analysis — all completed analyses.
pub async fn list_analyses(State(state): State<AppState>) -> Json<Vec<AnalysisEntry>> {
    let entries = state
        .pipeline
        .all_completed_results()
        .into_iter()
        .map(|(subject_id, result)| AnalysisEntry { subject_id, result })
        .collect();
    Json(entries)
}

/// GET /api/v1/queue/status — live pipeline counts.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.pipeline.queue_status())
}
