//! Job API Handlers
//!
//! HTTP endpoints for job submission and lifecycle.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use scanward_core::dto::job::{CreateJobRequest, JobDto, JobListQuery};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobDto>)> {
    tracing::info!("Creating job for project: {}", req.project_id);

    let job = state.jobs.create_job(req).await?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

/// POST /api/jobs/{id}/upload/{file_name}
pub async fn upload(
    State(state): State<AppState>,
    Path((id, file_name)): Path<(Uuid, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    tracing::debug!("Receiving upload {} ({} bytes) for job {}", file_name, body.len(), id);

    state.jobs.upload(id, &file_name, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/jobs/{id}/mark-ready
pub async fn mark_ready(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDto>> {
    let job = state.jobs.mark_ready(id).await?;
    Ok(Json(job.into()))
}

/// GET /api/jobs/{id}
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<JobDto>> {
    tracing::debug!("Getting job: {}", id);

    let job = state.jobs.get_job(id).await?;
    Ok(Json(job.into()))
}

/// GET /api/jobs?state=RUNNING
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<Vec<JobDto>>> {
    tracing::debug!("Listing jobs (state: {:?})", query.state);

    let jobs = state.jobs.list_jobs(query.state).await?;
    Ok(Json(jobs.into_iter().map(JobDto::from).collect()))
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDto>> {
    tracing::info!("Cancel requested for job: {}", id);

    let job = state.coordinator.cancel_job(id).await?;
    Ok(Json(job.into()))
}
