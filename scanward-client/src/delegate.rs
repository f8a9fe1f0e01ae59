//! Product delegation client
//!
//! A delegate is a remote server running one security product. The scheduler
//! creates a remote job, uploads the job's data, marks the remote job ready
//! and then polls it until it reaches a terminal state.

use async_trait::async_trait;
use reqwest::Client;
use scanward_core::domain::executor::{DelegateState, ExecutorConfig};
use scanward_core::domain::message::JobMessage;
use scanward_core::dto::delegate::{
    DelegateJobCreateRequest, DelegateJobCreateResponse, DelegateJobStatus, DelegateMessages,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::resilience::{ResiliencePolicy, ResilientExecutor};
use crate::{handle_empty_response, handle_response, handle_text_response};

/// A file uploaded for a job, stored locally by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub path: PathBuf,
}

/// What a delegate needs to know to start a remote job
#[derive(Debug, Clone, Default)]
pub struct RemoteJobRequest {
    pub job_id: Uuid,
    pub project_id: String,
    pub parameters: BTreeMap<String, String>,
    pub uploads: Vec<UploadedFile>,
}

/// Contract of a product delegation client
///
/// One implementation serves every executor of its kind, the executor
/// configuration tells it where the delegate lives.
#[async_trait]
pub trait DelegateClient: Send + Sync {
    /// Creates the remote job, uploads data, marks it ready and returns its id
    async fn start_remote_job(
        &self,
        executor: &ExecutorConfig,
        request: &RemoteJobRequest,
    ) -> Result<Uuid>;

    async fn poll_status(
        &self,
        executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<DelegateState>;

    /// Requests cancellation, the delegate confirms it through later polls
    async fn cancel(&self, executor: &ExecutorConfig, remote_job_id: Uuid) -> Result<()>;

    /// Raw result payload in the executor's result format
    async fn fetch_result(&self, executor: &ExecutorConfig, remote_job_id: Uuid)
    -> Result<String>;

    async fn fetch_messages(
        &self,
        executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<Vec<JobMessage>>;
}

/// HTTP implementation of the delegate protocol
///
/// Every single HTTP call runs under the resilience policy, so a flaky
/// mark-ready never creates a second remote job. The create call itself is
/// not repeated after a timeout.
#[derive(Debug, Clone)]
pub struct HttpDelegateClient {
    client: Client,
    resilience: ResilientExecutor,
}

impl HttpDelegateClient {
    /// Create a client with connect and overall request timeouts
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client, ResiliencePolicy::default()))
    }

    /// Create a client from a configured reqwest client and policy
    pub fn with_client(client: Client, policy: ResiliencePolicy) -> Self {
        Self {
            client,
            resilience: ResilientExecutor::new(policy),
        }
    }

    fn url(executor: &ExecutorConfig, path: &str) -> String {
        format!("{}/api/job/{}", executor.base_url.trim_end_matches('/'), path)
    }

    async fn create(&self, executor: &ExecutorConfig, request: &RemoteJobRequest) -> Result<Uuid> {
        let url = Self::url(executor, "create");
        let body = DelegateJobCreateRequest::new(
            request.job_id,
            &executor.product_id,
            &executor.parameters,
            &request.parameters,
        );

        let created: DelegateJobCreateResponse = self
            .resilience
            .execute_non_idempotent("delegate.create", || async {
                let response = self.client.post(&url).json(&body).send().await?;
                handle_response(response).await
            })
            .await?;

        Ok(created.job_uuid)
    }

    async fn upload(&self, executor: &ExecutorConfig, remote_job_id: Uuid, file: &UploadedFile) -> Result<()> {
        let data = tokio::fs::read(&file.path).await?;
        let url = Self::url(executor, &format!("{}/upload/{}", remote_job_id, file.name));

        debug!(
            remote_job_id = %remote_job_id,
            file = %file.name,
            bytes = data.len(),
            "Uploading job data to delegate"
        );

        self.resilience
            .execute("delegate.upload", || async {
                let response = self.client.put(&url).body(data.clone()).send().await?;
                handle_empty_response(response).await
            })
            .await
    }

    async fn mark_ready(&self, executor: &ExecutorConfig, remote_job_id: Uuid) -> Result<()> {
        let url = Self::url(executor, &format!("{}/mark-ready-to-start", remote_job_id));

        self.resilience
            .execute("delegate.mark_ready", || async {
                let response = self.client.put(&url).send().await?;
                handle_empty_response(response).await
            })
            .await
    }
}

#[async_trait]
impl DelegateClient for HttpDelegateClient {
    async fn start_remote_job(
        &self,
        executor: &ExecutorConfig,
        request: &RemoteJobRequest,
    ) -> Result<Uuid> {
        let remote_job_id = self.create(executor, request).await?;

        for file in &request.uploads {
            self.upload(executor, remote_job_id, file).await?;
        }

        self.mark_ready(executor, remote_job_id).await?;

        info!(
            job_id = %request.job_id,
            executor = %executor.name,
            remote_job_id = %remote_job_id,
            "Remote job started"
        );
        Ok(remote_job_id)
    }

    async fn poll_status(
        &self,
        executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<DelegateState> {
        let url = Self::url(executor, &format!("{}/status", remote_job_id));

        let status: DelegateJobStatus = self
            .resilience
            .execute("delegate.status", || async {
                let response = self.client.get(&url).send().await?;
                handle_response(response).await
            })
            .await?;

        Ok(status.state)
    }

    async fn cancel(&self, executor: &ExecutorConfig, remote_job_id: Uuid) -> Result<()> {
        let url = Self::url(executor, &format!("{}/cancel", remote_job_id));

        self.resilience
            .execute("delegate.cancel", || async {
                let response = self.client.put(&url).send().await?;
                handle_empty_response(response).await
            })
            .await
    }

    async fn fetch_result(
        &self,
        executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<String> {
        let url = Self::url(executor, &format!("{}/result", remote_job_id));

        self.resilience
            .execute("delegate.result", || async {
                let response = self.client.get(&url).send().await?;
                handle_text_response(response).await
            })
            .await
    }

    async fn fetch_messages(
        &self,
        executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<Vec<JobMessage>> {
        let url = Self::url(executor, &format!("{}/messages", remote_job_id));

        let messages: DelegateMessages = self
            .resilience
            .execute("delegate.messages", || async {
                let response = self.client.get(&url).send().await?;
                handle_response(response).await
            })
            .await?;

        Ok(messages.messages.into_iter().map(JobMessage::from).collect())
    }
}
