//! Job DTOs for the scheduler API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::executor::ExecutorJobReference;
use crate::domain::finding::ScanResult;
use crate::domain::job::{Job, JobConfiguration, JobState};
use crate::domain::message::JobMessage;

/// Request to create a new scan job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub project_id: String,
    pub owner: String,
    pub configuration: JobConfiguration,
}

/// Request to restart a running or suspended job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartJobRequest {
    /// Hard restart discards existing executor jobs
    #[serde(default)]
    pub hard: bool,
}

/// Enable or disable job processing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProcessingToggle {
    pub enabled: bool,
}

/// Query parameters for listing jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub state: Option<JobState>,
}

/// Job as exposed to API consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDto {
    pub id: Uuid,
    pub project_id: String,
    pub owner: String,
    pub state: JobState,
    pub configuration: JobConfiguration,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub suspend_count: u32,
    pub executed_by: Option<String>,
    pub uploads: Vec<String>,
    pub executor_jobs: Vec<ExecutorJobReference>,
    pub messages: Vec<JobMessage>,
    pub result: Option<ScanResult>,
}

impl From<Job> for JobDto {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            project_id: job.project_id,
            owner: job.owner,
            state: job.state,
            configuration: job.configuration,
            created_at: job.created_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            cancel_requested: job.cancel_requested,
            suspend_count: job.suspend_count,
            executed_by: job.executed_by,
            uploads: job.uploads,
            executor_jobs: job.executor_jobs,
            messages: job.messages,
            result: job.result,
        }
    }
}
