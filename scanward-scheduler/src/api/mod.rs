//! API Module
//!
//! HTTP API layer of the scheduler. A thin surface over the services, each
//! submodule handles the endpoints of one area.

pub mod admin;
pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{CancellationCoordinator, JobService, StatusReporter};

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub status: Arc<StatusReporter>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/api/jobs", post(job::create_job).get(job::list_jobs))
        .route("/api/jobs/{id}", get(job::get_job))
        .route(
            "/api/jobs/{id}/upload/{file_name}",
            post(job::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/jobs/{id}/mark-ready", put(job::mark_ready))
        .route("/api/jobs/{id}/cancel", post(job::cancel_job))
        // Admin endpoints
        .route("/api/admin/jobs/{id}/restart", post(admin::restart_job))
        .route("/api/admin/scheduler/status", get(admin::scheduler_status))
        .route(
            "/api/admin/scheduler/status/refresh",
            post(admin::refresh_status),
        )
        .route(
            "/api/admin/scheduler/processing",
            put(admin::set_job_processing),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
