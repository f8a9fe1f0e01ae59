//! Job Service
//!
//! Job submission and lookup for the HTTP surface: validates requests, stores
//! uploads and delegates every state change to the state machine.

use scanward_core::domain::job::{Job, JobState, ScanType};
use scanward_core::dto::job::CreateJobRequest;
use scanward_core::usecase::UseCaseId;
use scanward_core::whitelist::is_whitelisted;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::StoreError;
use crate::service::profiles::ProfileResolver;
use crate::service::state_machine::{JobStateMachine, TransitionError};
use crate::service::uploads::{UploadError, UploadStore};

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Transition(TransitionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TransitionError> for JobError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Transition(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

pub struct JobService {
    machine: Arc<JobStateMachine>,
    profiles: Arc<dyn ProfileResolver>,
    uploads: UploadStore,
}

impl JobService {
    pub fn new(
        machine: Arc<JobStateMachine>,
        profiles: Arc<dyn ProfileResolver>,
        uploads: UploadStore,
    ) -> Self {
        Self {
            machine,
            profiles,
            uploads,
        }
    }

    /// Create a new job in state CREATED
    pub async fn create_job(&self, req: CreateJobRequest) -> Result<Job> {
        self.validate_create_request(&req)?;

        let job = self
            .machine
            .create_job(Job::new(req.project_id, req.owner, req.configuration))
            .await?;

        tracing::info!(use_case = %UseCaseId::UserCreatesJob, job_id = %job.id, "Job created");
        Ok(job)
    }

    fn validate_create_request(&self, req: &CreateJobRequest) -> Result<()> {
        if req.project_id.trim().is_empty() {
            return Err(JobError::Validation("Project id cannot be empty".to_string()));
        }

        if req.owner.trim().is_empty() {
            return Err(JobError::Validation("Owner cannot be empty".to_string()));
        }

        let configuration = &req.configuration;
        if configuration.scan_types.is_empty() {
            return Err(JobError::Validation(
                "At least one scan type is required".to_string(),
            ));
        }

        if configuration.scan_types.contains(&ScanType::WebScan) {
            let target = configuration.web_target.as_deref().ok_or_else(|| {
                JobError::Validation("Web scans require a target URL".to_string())
            })?;

            if !is_whitelisted(target, &self.profiles.whitelist_for(&req.project_id)) {
                return Err(JobError::Validation(format!(
                    "Target {} is not whitelisted for project '{}'",
                    target, req.project_id
                )));
            }
        }

        Ok(())
    }

    /// Store an uploaded file, the job must still be CREATED
    pub async fn upload(&self, job_id: Uuid, file_name: &str, data: &[u8]) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        if job.state != JobState::Created {
            return Err(JobError::Transition(TransitionError::InvalidState {
                id: job_id,
                state: job.state,
                expected: JobState::Created.to_string(),
            }));
        }

        self.uploads.store(job_id, file_name, data).await?;
        let job = self.machine.record_upload(job_id, file_name).await?;

        tracing::info!(
            use_case = %UseCaseId::UserUploadsData,
            job_id = %job_id,
            file_name,
            "Job data uploaded"
        );
        Ok(job)
    }

    pub async fn mark_ready(&self, job_id: Uuid) -> Result<Job> {
        let job = self.machine.mark_ready(job_id).await?;
        tracing::info!(use_case = %UseCaseId::UserMarksJobReady, job_id = %job_id, "Job ready to start");
        Ok(job)
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        tracing::debug!(use_case = %UseCaseId::UserGetsJobStatus, job_id = %job_id, "Job requested");
        self.machine
            .store()
            .find_by_id(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))
    }

    /// List jobs, newest first, optionally filtered by state
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let jobs = self.machine.store().list_all().await?;
        Ok(match state {
            Some(state) => jobs.into_iter().filter(|job| job.state == state).collect(),
            None => jobs,
        })
    }
}
