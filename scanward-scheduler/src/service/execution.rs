//! Job execution
//!
//! Drives one claimed job: starts (or reattaches to) one remote job per
//! executor, polls the delegates until all of them reach a terminal state,
//! then aggregates their results. A pending cancel request switches the poll
//! loop into cancel mode.

use scanward_client::{ClientError, DelegateClient, RemoteJobRequest};
use scanward_core::domain::executor::{DelegateState, ExecutorConfig, ExecutorJobReference};
use scanward_core::domain::job::{Job, JobState};
use scanward_core::domain::message::JobMessage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::service::aggregator::{AggregationOutcome, ExecutorOutput, ResultAggregator};
use crate::service::delegates::DelegateRegistry;
use crate::service::profiles::ProfileResolver;
use crate::service::state_machine::{JobStateMachine, TransitionError};
use crate::service::uploads::UploadStore;

/// Parameter carrying the web scan target to the delegates
pub const WEB_TARGET_PARAMETER: &str = "scanward.web.target";

pub const CANCEL_CONFIRMED: &str = "All product delegates confirmed cancellation";

/// Dispatch error type
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Executor '{executor}' failed: {source}")]
    Delegate {
        executor: String,
        source: ClientError,
    },

    #[error("Executors did not finish within {0:?}")]
    PollTimeout(Duration),

    #[error("Executor '{executor}' ended in state {state}")]
    ExecutorFailed {
        executor: String,
        state: DelegateState,
    },

    #[error("Result aggregation failed: {0}")]
    Aggregation(String),

    /// Local execution was stopped (shutdown or restart)
    #[error("Execution interrupted")]
    Interrupted,

    #[error("Job is no longer executed by this instance")]
    OwnershipLost,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Executor configuration paired with the client serving it
#[derive(Clone)]
struct Assignment {
    executor: ExecutorConfig,
    client: Arc<dyn DelegateClient>,
}

/// Executes claimed jobs, one task per job
pub struct JobRunner {
    machine: Arc<JobStateMachine>,
    profiles: Arc<dyn ProfileResolver>,
    delegates: DelegateRegistry,
    uploads: UploadStore,
    aggregator: ResultAggregator,
    instance_id: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    cancel_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        config: &Config,
        machine: Arc<JobStateMachine>,
        profiles: Arc<dyn ProfileResolver>,
        delegates: DelegateRegistry,
        uploads: UploadStore,
    ) -> Self {
        Self {
            machine,
            profiles,
            delegates,
            uploads,
            aggregator: ResultAggregator::new(),
            instance_id: config.instance_id.clone(),
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
            cancel_timeout: config.cancel_timeout,
        }
    }

    /// Runs a RUNNING job to its end
    ///
    /// Failures are recorded on the job, never left in RUNNING. An interrupted
    /// execution or a job taken over elsewhere is left alone.
    pub async fn run(&self, job: Job, token: CancellationToken) {
        let job_id = job.id;
        info!("Starting execution of job {}", job_id);

        match self.execute(job, &token).await {
            Ok(state) => info!(job_id = %job_id, state = %state, "Job execution finished"),
            Err(DispatchError::Interrupted) => {
                info!(job_id = %job_id, "Job execution interrupted")
            }
            Err(DispatchError::OwnershipLost) => {
                info!(job_id = %job_id, "Job left this instance, stopping execution")
            }
            Err(err) if token.is_cancelled() => {
                info!(job_id = %job_id, error = %err, "Job execution interrupted")
            }
            Err(err) => {
                if !self.still_owned(job_id).await {
                    info!(job_id = %job_id, error = %err, "Job left this instance, stopping execution");
                    return;
                }
                error!(job_id = %job_id, error = %err, "Job execution failed");
                if let Err(fail_err) = self.machine.fail(job_id, JobMessage::error(err.to_string())).await {
                    warn!(job_id = %job_id, error = %fail_err, "Failed to mark job as failed");
                }
            }
        }
    }

    async fn still_owned(&self, job_id: Uuid) -> bool {
        match self.machine.load(job_id).await {
            Ok(job) => {
                matches!(job.state, JobState::Running | JobState::CancelRequested)
                    && job.executed_by.as_deref() == Some(self.instance_id.as_str())
            }
            Err(_) => false,
        }
    }

    async fn execute(&self, job: Job, token: &CancellationToken) -> Result<JobState, DispatchError> {
        let assignments = self.assign_executors(&job)?;
        let job = self.start_remote_jobs(job, &assignments, token).await?;
        self.supervise(job.id, &assignments, token).await
    }

    /// Resolves executors for every requested scan type, in profile order
    fn assign_executors(&self, job: &Job) -> Result<Vec<Assignment>, DispatchError> {
        let mut assignments: Vec<Assignment> = Vec::new();

        for scan_type in &job.configuration.scan_types {
            let executors = self
                .profiles
                .resolve_executors_for(&job.project_id, *scan_type)
                .map_err(|err| DispatchError::Configuration(err.to_string()))?;

            for executor in executors {
                if assignments.iter().any(|a| a.executor.id == executor.id) {
                    continue;
                }
                let client = self.delegates.client_for(executor.kind).ok_or_else(|| {
                    DispatchError::Configuration(format!(
                        "No delegate client registered for executor '{}' of kind {}",
                        executor.name, executor.kind
                    ))
                })?;
                assignments.push(Assignment { executor, client });
            }
        }

        if assignments.is_empty() {
            return Err(DispatchError::Configuration(format!(
                "No executors configured for project '{}'",
                job.project_id
            )));
        }

        Ok(assignments)
    }

    async fn start_remote_jobs(
        &self,
        mut job: Job,
        assignments: &[Assignment],
        token: &CancellationToken,
    ) -> Result<Job, DispatchError> {
        for assignment in assignments {
            if token.is_cancelled() {
                return Err(DispatchError::Interrupted);
            }

            let executor = &assignment.executor;
            if let Some(existing) = job.executor_job(executor.id) {
                debug!(
                    job_id = %job.id,
                    executor = %executor.name,
                    remote_job_id = %existing.remote_job_id,
                    "Reattaching to remote job"
                );
                continue;
            }

            let request = self.remote_request(&job);
            let remote_job_id = assignment
                .client
                .start_remote_job(executor, &request)
                .await
                .map_err(|source| DispatchError::Delegate {
                    executor: executor.name.clone(),
                    source,
                })?;

            info!(
                job_id = %job.id,
                executor = %executor.name,
                remote_job_id = %remote_job_id,
                "Remote job started"
            );

            job = self
                .machine
                .record_executor_jobs(job.id, vec![ExecutorJobReference::new(executor, remote_job_id)])
                .await?;
        }

        Ok(job)
    }

    fn remote_request(&self, job: &Job) -> RemoteJobRequest {
        let mut parameters = job.configuration.parameters.clone();
        if let Some(target) = &job.configuration.web_target {
            parameters.insert(WEB_TARGET_PARAMETER.to_string(), target.clone());
        }

        RemoteJobRequest {
            job_id: job.id,
            project_id: job.project_id.clone(),
            parameters,
            uploads: self.uploads.files_for(job),
        }
    }

    /// Poll loop, ends with the job's terminal state
    async fn supervise(
        &self,
        job_id: Uuid,
        assignments: &[Assignment],
        token: &CancellationToken,
    ) -> Result<JobState, DispatchError> {
        let started = Instant::now();
        let mut cancel_deadline: Option<Instant> = None;
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(DispatchError::Interrupted),
                _ = interval.tick() => {}
            }

            let job = self.machine.load(job_id).await?;
            let owned = job.executed_by.as_deref() == Some(self.instance_id.as_str());
            if !owned || !matches!(job.state, JobState::Running | JobState::CancelRequested) {
                return Err(DispatchError::OwnershipLost);
            }

            if job.state == JobState::CancelRequested && cancel_deadline.is_none() {
                self.cancel_remote_jobs(&job, assignments).await;
                cancel_deadline = Some(Instant::now() + self.cancel_timeout);
            }

            let cancelling = cancel_deadline.is_some();
            let polled = self.poll_pending(&job, assignments, cancelling).await?;
            let job = if polled.is_empty() {
                job
            } else {
                self.machine.record_delegate_states(job_id, &polled).await?
            };

            let all_terminal = job
                .executor_jobs
                .iter()
                .all(|reference| reference.delegate_state.is_terminal());

            if let Some(deadline) = cancel_deadline {
                if all_terminal {
                    self.machine
                        .confirm_canceled(job_id, JobMessage::info(CANCEL_CONFIRMED))
                        .await?;
                    return Ok(JobState::Canceled);
                }
                if Instant::now() >= deadline {
                    warn!(job_id = %job_id, "Delegates did not confirm cancellation in time");
                    self.machine
                        .confirm_canceled(
                            job_id,
                            JobMessage::warning(format!(
                                "Product delegates did not confirm cancellation within {:?}, job canceled locally",
                                self.cancel_timeout
                            )),
                        )
                        .await?;
                    return Ok(JobState::Canceled);
                }
                continue;
            }

            if all_terminal {
                return self.finish(&job, assignments).await;
            }

            if started.elapsed() >= self.poll_timeout {
                return Err(DispatchError::PollTimeout(self.poll_timeout));
            }
        }
    }

    /// Best effort, delegates confirm through later polls
    async fn cancel_remote_jobs(&self, job: &Job, assignments: &[Assignment]) {
        for reference in job.executor_jobs.iter().filter(|r| !r.delegate_state.is_terminal()) {
            let Some(assignment) = find_assignment(assignments, reference.executor_id) else {
                continue;
            };
            match assignment
                .client
                .cancel(&assignment.executor, reference.remote_job_id)
                .await
            {
                Ok(()) => debug!(
                    job_id = %job.id,
                    remote_job_id = %reference.remote_job_id,
                    "Remote cancel requested"
                ),
                Err(err) => warn!(
                    job_id = %job.id,
                    remote_job_id = %reference.remote_job_id,
                    error = %err,
                    "Remote cancel failed"
                ),
            }
        }
    }

    async fn poll_pending(
        &self,
        job: &Job,
        assignments: &[Assignment],
        cancelling: bool,
    ) -> Result<Vec<(Uuid, DelegateState)>, DispatchError> {
        let mut polled = Vec::new();

        for reference in job.executor_jobs.iter().filter(|r| !r.delegate_state.is_terminal()) {
            let assignment = find_assignment(assignments, reference.executor_id).ok_or_else(|| {
                DispatchError::Configuration(format!(
                    "Executor '{}' is no longer configured",
                    reference.executor_name
                ))
            })?;

            match assignment
                .client
                .poll_status(&assignment.executor, reference.remote_job_id)
                .await
            {
                Ok(state) => {
                    if state != reference.delegate_state {
                        debug!(
                            job_id = %job.id,
                            remote_job_id = %reference.remote_job_id,
                            state = %state,
                            "Delegate state changed"
                        );
                    }
                    polled.push((reference.remote_job_id, state));
                }
                Err(err) if cancelling => {
                    warn!(job_id = %job.id, error = %err, "Polling canceled remote job failed");
                }
                Err(source) => {
                    return Err(DispatchError::Delegate {
                        executor: reference.executor_name.clone(),
                        source,
                    });
                }
            }
        }

        Ok(polled)
    }

    /// Collects results once every delegate is done
    async fn finish(&self, job: &Job, assignments: &[Assignment]) -> Result<JobState, DispatchError> {
        if let Some(failed) = job
            .executor_jobs
            .iter()
            .find(|r| r.delegate_state != DelegateState::Done)
        {
            return Err(DispatchError::ExecutorFailed {
                executor: failed.executor_name.clone(),
                state: failed.delegate_state,
            });
        }

        let mut outputs = Vec::new();
        let mut messages = Vec::new();

        for reference in &job.executor_jobs {
            let Some(assignment) = find_assignment(assignments, reference.executor_id) else {
                continue;
            };
            let executor = &assignment.executor;

            match assignment.client.fetch_messages(executor, reference.remote_job_id).await {
                Ok(delegate_messages) => messages.extend(delegate_messages),
                Err(err) => warn!(
                    job_id = %job.id,
                    executor = %executor.name,
                    error = %err,
                    "Fetching delegate messages failed"
                ),
            }

            match assignment.client.fetch_result(executor, reference.remote_job_id).await {
                Ok(raw) => outputs.push(ExecutorOutput {
                    executor_id: executor.id,
                    executor_name: executor.name.clone(),
                    format: executor.result_format,
                    raw,
                }),
                Err(err) => {
                    warn!(job_id = %job.id, executor = %executor.name, error = %err, "Fetching result failed");
                    messages.push(JobMessage::warning(format!(
                        "Result of executor '{}' could not be fetched: {}",
                        executor.name, err
                    )));
                }
            }
        }

        match self.aggregator.aggregate(outputs) {
            AggregationOutcome::Success { result, warnings } => {
                messages.extend(warnings);
                let findings = result.findings.len();
                self.machine.complete(job.id, result, messages).await?;
                info!(job_id = %job.id, findings, "Job results aggregated");
                Ok(JobState::Done)
            }
            AggregationOutcome::TotalFailure { errors } => {
                Err(DispatchError::Aggregation(errors.join("; ")))
            }
        }
    }
}

fn find_assignment(assignments: &[Assignment], executor_id: Uuid) -> Option<&Assignment> {
    assignments.iter().find(|a| a.executor.id == executor_id)
}
