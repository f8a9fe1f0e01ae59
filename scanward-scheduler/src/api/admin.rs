//! Admin API Handlers
//!
//! Scheduler operations: processing toggle, status and job restarts.

use axum::{
    Json,
    extract::{Path, State},
};
use scanward_core::domain::status::SchedulerStatusSnapshot;
use scanward_core::dto::job::{JobDto, ProcessingToggle, RestartJobRequest};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/admin/jobs/{id}/restart
pub async fn restart_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RestartJobRequest>,
) -> ApiResult<Json<JobDto>> {
    tracing::info!("Restart requested for job: {} (hard: {})", id, req.hard);

    let job = state.coordinator.restart_job(id, req.hard).await?;
    Ok(Json(job.into()))
}

/// GET /api/admin/scheduler/status
pub async fn scheduler_status(
    State(state): State<AppState>,
) -> ApiResult<Json<SchedulerStatusSnapshot>> {
    Ok(Json(state.status.snapshot().await?))
}

/// POST /api/admin/scheduler/status/refresh
pub async fn refresh_status(
    State(state): State<AppState>,
) -> ApiResult<Json<SchedulerStatusSnapshot>> {
    Ok(Json(state.status.refresh().await?))
}

/// PUT /api/admin/scheduler/processing
pub async fn set_job_processing(
    State(state): State<AppState>,
    Json(toggle): Json<ProcessingToggle>,
) -> ApiResult<Json<ProcessingToggle>> {
    state.status.set_job_processing_enabled(toggle.enabled).await?;
    Ok(Json(toggle))
}
