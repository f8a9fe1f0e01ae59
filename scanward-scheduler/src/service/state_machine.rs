//! Job State Machine
//!
//! Single gate for every job mutation. Each operation loads the job, checks
//! the requested edge against [`JobState::can_transition_to`], applies the
//! change and writes it back with a version check. A write that loses against
//! a concurrent writer is retried on a fresh read a bounded number of times.
//! Claiming and starting are the exception: they are the dispatch gate and
//! report a lost race to the caller instead of retrying.

use chrono::Utc;
use scanward_core::domain::event::{EventPayload, MessageId};
use scanward_core::domain::executor::{DelegateState, ExecutorJobReference};
use scanward_core::domain::finding::ScanResult;
use scanward_core::domain::job::{Job, JobState};
use scanward_core::domain::message::JobMessage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{JobStore, StoreError};
use crate::service::events::EventBus;

/// Message recorded when a user cancels a job
pub const CANCELED_BY_USER: &str = "Job execution was canceled by user";

const DEFAULT_STALE_RETRIES: u32 = 3;

/// Transition error type
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobState,
        to: JobState,
    },

    #[error("Job {id} is {state}, expected {expected}")]
    InvalidState {
        id: Uuid,
        state: JobState,
        expected: String,
    },

    #[error("Job {id} is already finished ({state})")]
    AlreadyFinished { id: Uuid, state: JobState },

    /// Lost against a concurrent writer
    #[error("Job {id} was changed concurrently")]
    Stale { id: Uuid },

    #[error(transparent)]
    Store(StoreError),
}

impl TransitionError {
    pub fn is_stale(&self) -> bool {
        matches!(self, TransitionError::Stale { .. })
    }
}

impl From<StoreError> for TransitionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TransitionError::NotFound(id),
            StoreError::Stale { id, .. } => TransitionError::Stale { id },
            other => TransitionError::Store(other),
        }
    }
}

fn ensure_edge(job: &Job, to: JobState) -> Result<(), TransitionError> {
    if job.state.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition {
            id: job.id,
            from: job.state,
            to,
        })
    }
}

fn ensure_state(job: &Job, allowed: &[JobState]) -> Result<(), TransitionError> {
    if allowed.contains(&job.state) {
        return Ok(());
    }
    let expected = allowed
        .iter()
        .map(|state| state.as_str())
        .collect::<Vec<_>>()
        .join("|");
    Err(TransitionError::InvalidState {
        id: job.id,
        state: job.state,
        expected,
    })
}

pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
    events: Arc<EventBus>,
    max_stale_retries: u32,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            max_stale_retries: DEFAULT_STALE_RETRIES,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn load(&self, id: Uuid) -> Result<Job, TransitionError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(TransitionError::NotFound(id))
    }

    // =============================================================================
    // Submission
    // =============================================================================

    pub async fn create_job(&self, job: Job) -> Result<Job, TransitionError> {
        ensure_state(&job, &[JobState::Created])?;
        self.store.create(&job).await?;

        info!(job_id = %job.id, project_id = %job.project_id, "Job created");
        Ok(job)
    }

    /// Records the name of an uploaded file, only while the job is created
    pub async fn record_upload(&self, id: Uuid, file_name: &str) -> Result<Job, TransitionError> {
        self.update(id, &[JobState::Created], |job| {
            if !job.uploads.iter().any(|name| name == file_name) {
                job.uploads.push(file_name.to_string());
            }
        })
        .await
    }

    pub async fn mark_ready(&self, id: Uuid) -> Result<Job, TransitionError> {
        self.transition(id, JobState::ReadyToStart, |_| {}).await
    }

    // =============================================================================
    // Dispatch gate
    // =============================================================================

    /// Moves a READY_TO_START job to QUEUED if nobody touched it since `expected_version`
    pub async fn claim(&self, id: Uuid, expected_version: i64) -> Result<Job, TransitionError> {
        let job = self.load(id).await?;
        if job.version != expected_version {
            return Err(TransitionError::Stale { id });
        }
        if job.state != JobState::ReadyToStart {
            return Err(TransitionError::InvalidTransition {
                id,
                from: job.state,
                to: JobState::Queued,
            });
        }

        let claimed = self
            .store
            .compare_and_swap_state(id, expected_version, JobState::Queued)
            .await?;
        self.publish_state_change(&claimed, job.state);
        Ok(claimed)
    }

    /// Moves a QUEUED job to RUNNING on `instance_id` if nobody touched it since `expected_version`
    pub async fn start(
        &self,
        id: Uuid,
        expected_version: i64,
        instance_id: &str,
    ) -> Result<Job, TransitionError> {
        let mut job = self.load(id).await?;
        if job.version != expected_version {
            return Err(TransitionError::Stale { id });
        }
        ensure_edge(&job, JobState::Running)?;

        let from = job.state;
        job.state = JobState::Running;
        job.started_at.get_or_insert_with(Utc::now);
        job.executed_by = Some(instance_id.to_string());

        let started = self.store.save(&job).await?;
        self.publish_state_change(&started, from);
        Ok(started)
    }

    // =============================================================================
    // Execution bookkeeping
    // =============================================================================

    /// Adds or replaces executor job references, matched by executor id
    pub async fn record_executor_jobs(
        &self,
        id: Uuid,
        references: Vec<ExecutorJobReference>,
    ) -> Result<Job, TransitionError> {
        self.update(
            id,
            &[JobState::Running, JobState::CancelRequested],
            |job| {
                for reference in &references {
                    match job
                        .executor_jobs
                        .iter_mut()
                        .find(|existing| existing.executor_id == reference.executor_id)
                    {
                        Some(existing) => *existing = reference.clone(),
                        None => job.executor_jobs.push(reference.clone()),
                    }
                }
            },
        )
        .await
    }

    /// Stores polled delegate states, keyed by remote job id
    pub async fn record_delegate_states(
        &self,
        id: Uuid,
        states: &[(Uuid, DelegateState)],
    ) -> Result<Job, TransitionError> {
        self.update(
            id,
            &[JobState::Running, JobState::CancelRequested],
            |job| {
                let now = Utc::now();
                for (remote_job_id, state) in states {
                    if let Some(reference) = job
                        .executor_jobs
                        .iter_mut()
                        .find(|r| r.remote_job_id == *remote_job_id)
                    {
                        reference.delegate_state = *state;
                        reference.last_polled_at = Some(now);
                    }
                }
            },
        )
        .await
    }

    // =============================================================================
    // Cancellation and suspension
    // =============================================================================

    pub async fn request_cancel(&self, id: Uuid) -> Result<Job, TransitionError> {
        self.transition(id, JobState::CancelRequested, |job| {
            job.cancel_requested = true;
            job.cancel_requested_at = Some(Utc::now());
            job.messages.push(JobMessage::info(CANCELED_BY_USER));
        })
        .await
    }

    pub async fn confirm_canceled(
        &self,
        id: Uuid,
        message: JobMessage,
    ) -> Result<Job, TransitionError> {
        self.transition(id, JobState::Canceled, |job| {
            job.ended_at = Some(Utc::now());
            job.messages.push(message.clone());
        })
        .await
    }

    /// Suspends a running job, its delegates keep running
    pub async fn suspend(&self, id: Uuid) -> Result<Job, TransitionError> {
        self.transition(id, JobState::Suspended, |job| {
            job.suspend_count += 1;
            job.suspended_at = Some(Utc::now());
            job.executed_by = None;
        })
        .await
    }

    /// Requeues a suspended job, keeping its executor job references
    pub async fn resume(&self, id: Uuid) -> Result<Job, TransitionError> {
        self.transition(id, JobState::Queued, |job| {
            job.suspended_at = None;
        })
        .await
    }

    /// Restarts a running or suspended job
    ///
    /// A soft restart keeps the executor job references so the next dispatch
    /// reattaches to the remote jobs, a hard restart drops them.
    pub async fn restart(&self, id: Uuid, hard: bool) -> Result<Job, TransitionError> {
        let job = self.load(id).await?;
        if job.is_terminal() {
            return Err(TransitionError::AlreadyFinished {
                id,
                state: job.state,
            });
        }
        ensure_state(&job, &[JobState::Running, JobState::Suspended])?;

        if job.state == JobState::Running {
            self.suspend(id).await?;
        }

        let text = if hard {
            "Job restarted, executor jobs discarded"
        } else {
            "Job restarted, reattaching to executor jobs"
        };
        self.transition(id, JobState::Queued, |job| {
            job.suspended_at = None;
            if hard {
                job.executor_jobs.clear();
            }
            job.messages.push(JobMessage::info(text));
        })
        .await
    }

    // =============================================================================
    // Completion
    // =============================================================================

    pub async fn complete(
        &self,
        id: Uuid,
        result: ScanResult,
        messages: Vec<JobMessage>,
    ) -> Result<Job, TransitionError> {
        self.transition(id, JobState::Done, |job| {
            job.ended_at = Some(Utc::now());
            job.result = Some(result.clone());
            job.messages.extend(messages.iter().cloned());
        })
        .await
    }

    pub async fn fail(&self, id: Uuid, message: JobMessage) -> Result<Job, TransitionError> {
        self.transition(id, JobState::Failed, |job| {
            job.ended_at = Some(Utc::now());
            job.messages.push(message.clone());
        })
        .await
    }

    // =============================================================================
    // Helpers
    // =============================================================================

    async fn transition<F>(&self, id: Uuid, to: JobState, mutate: F) -> Result<Job, TransitionError>
    where
        F: Fn(&mut Job) + Send + Sync,
    {
        self.modify(id, |job| {
            ensure_edge(job, to)?;
            job.state = to;
            mutate(job);
            Ok(())
        })
        .await
    }

    async fn update<F>(
        &self,
        id: Uuid,
        allowed: &[JobState],
        mutate: F,
    ) -> Result<Job, TransitionError>
    where
        F: Fn(&mut Job) + Send + Sync,
    {
        self.modify(id, |job| {
            ensure_state(job, allowed)?;
            mutate(job);
            Ok(())
        })
        .await
    }

    async fn modify<F>(&self, id: Uuid, change: F) -> Result<Job, TransitionError>
    where
        F: Fn(&mut Job) -> Result<(), TransitionError> + Send + Sync,
    {
        for attempt in 1..=self.max_stale_retries {
            let mut job = self.load(id).await?;
            let from = job.state;
            change(&mut job)?;

            match self.store.save(&job).await {
                Ok(saved) => {
                    if saved.state != from {
                        self.publish_state_change(&saved, from);
                    }
                    return Ok(saved);
                }
                Err(StoreError::Stale { .. }) => {
                    debug!(job_id = %id, attempt, "Concurrent job modification, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            job_id = %id,
            attempts = self.max_stale_retries,
            "Giving up on job modification after concurrent changes"
        );
        Err(TransitionError::Stale { id })
    }

    fn publish_state_change(&self, job: &Job, from: JobState) {
        info!(job_id = %job.id, from = %from, to = %job.state, "Job state changed");
        self.events.publish(
            MessageId::JobStateChanged,
            EventPayload::JobState {
                job_id: job.id,
                project_id: job.project_id.clone(),
                from,
                to: job.state,
            },
        );
    }
}
