//! Scheduler API endpoints

use scanward_core::domain::job::JobState;
use scanward_core::domain::status::SchedulerStatusSnapshot;
use scanward_core::dto::job::{CreateJobRequest, JobDto, ProcessingToggle, RestartJobRequest};
use uuid::Uuid;

use crate::SchedulerClient;
use crate::error::Result;
use crate::{handle_empty_response, handle_response};

impl SchedulerClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Create a new scan job
    ///
    /// # Example
    /// ```no_run
    /// # use scanward_client::SchedulerClient;
    /// # use scanward_core::dto::job::CreateJobRequest;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = SchedulerClient::new("http://localhost:8080");
    /// let job = client.create_job(CreateJobRequest {
    ///     project_id: "alpha".to_string(),
    ///     owner: "alice".to_string(),
    ///     configuration: Default::default(),
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_job(&self, req: CreateJobRequest) -> Result<JobDto> {
        let url = format!("{}/api/jobs", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        handle_response(response).await
    }

    /// Upload a data file for a created job
    pub async fn upload(&self, job_id: Uuid, file_name: &str, data: Vec<u8>) -> Result<()> {
        let url = format!("{}/api/jobs/{}/upload/{}", self.base_url, job_id, file_name);
        let response = self.client.post(&url).body(data).send().await?;

        handle_empty_response(response).await
    }

    /// Mark a created job ready to start
    pub async fn mark_ready(&self, job_id: Uuid) -> Result<JobDto> {
        let url = format!("{}/api/jobs/{}/mark-ready", self.base_url, job_id);
        let response = self.client.put(&url).send().await?;

        handle_response(response).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobDto> {
        let url = format!("{}/api/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// List jobs, optionally only those in one state
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<JobDto>> {
        let url = format!("{}/api/jobs", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(state) = state {
            request = request.query(&[("state", state.as_str())]);
        }
        let response = request.send().await?;

        handle_response(response).await
    }

    /// Request cancellation of a running job
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobDto> {
        let url = format!("{}/api/jobs/{}/cancel", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Administration
    // =============================================================================

    /// Restart a running or suspended job
    pub async fn restart_job(&self, job_id: Uuid, hard: bool) -> Result<JobDto> {
        let url = format!("{}/api/admin/jobs/{}/restart", self.base_url, job_id);
        let response = self
            .client
            .post(&url)
            .json(&RestartJobRequest { hard })
            .send()
            .await?;

        handle_response(response).await
    }

    /// Current scheduler status
    pub async fn scheduler_status(&self) -> Result<SchedulerStatusSnapshot> {
        let url = format!("{}/api/admin/scheduler/status", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Recompute the scheduler status and publish it
    pub async fn refresh_status(&self) -> Result<SchedulerStatusSnapshot> {
        let url = format!("{}/api/admin/scheduler/status/refresh", self.base_url);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    /// Enable or disable job processing cluster wide
    pub async fn set_job_processing(&self, enabled: bool) -> Result<ProcessingToggle> {
        let url = format!("{}/api/admin/scheduler/processing", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&ProcessingToggle { enabled })
            .send()
            .await?;

        handle_response(response).await
    }

    /// Check that the scheduler is up
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_empty_response(response).await
    }
}
