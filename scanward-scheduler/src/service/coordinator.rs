//! Cancellation & Suspension Coordinator
//!
//! User cancel requests, admin restarts, suspension on shutdown and the
//! periodic system checks that requeue suspended jobs and finish cancel
//! requests whose owning instance went away.

use chrono::Utc;
use scanward_core::domain::event::{EventPayload, MessageId};
use scanward_core::domain::job::{Job, JobState};
use scanward_core::domain::message::JobMessage;
use scanward_core::usecase::UseCaseId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::StoreError;
use crate::service::delegates::DelegateRegistry;
use crate::service::events::EventBus;
use crate::service::profiles::ProfileResolver;
use crate::service::state_machine::{JobStateMachine, TransitionError};
use crate::service::tracker::LocalJobs;

/// Jobs inspected per system check
const CHECK_BATCH_SIZE: usize = 100;

pub const RESTART_JOB_NOT_FOUND: &str = "Restart canceled, because job not found";

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

pub struct CancellationCoordinator {
    machine: Arc<JobStateMachine>,
    events: Arc<EventBus>,
    profiles: Arc<dyn ProfileResolver>,
    delegates: DelegateRegistry,
    local_jobs: Arc<LocalJobs>,
    shutdown: CancellationToken,
    cancel_timeout: Duration,
    resume_min_suspend: Duration,
    system_check_interval: Duration,
}

impl CancellationCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        machine: Arc<JobStateMachine>,
        events: Arc<EventBus>,
        profiles: Arc<dyn ProfileResolver>,
        delegates: DelegateRegistry,
        local_jobs: Arc<LocalJobs>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            machine,
            events,
            profiles,
            delegates,
            local_jobs,
            shutdown,
            cancel_timeout: config.cancel_timeout,
            resume_min_suspend: config.resume_min_suspend,
            system_check_interval: config.system_check_interval,
        }
    }

    /// Requests cancellation of a running job
    ///
    /// The instance executing the job observes the request on its next poll
    /// and asks the delegates to cancel.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<Job, TransitionError> {
        let job = self.machine.request_cancel(job_id).await?;

        info!(use_case = %UseCaseId::AdminCancelsJob, job_id = %job_id, "Job cancel requested");
        self.events.publish(
            MessageId::JobCancelRequested,
            EventPayload::JobState {
                job_id,
                project_id: job.project_id.clone(),
                from: JobState::Running,
                to: JobState::CancelRequested,
            },
        );

        Ok(job)
    }

    /// Restarts a running or suspended job, see [`JobStateMachine::restart`]
    pub async fn restart_job(&self, job_id: Uuid, hard: bool) -> Result<Job, TransitionError> {
        let use_case = if hard {
            UseCaseId::AdminRestartsJobHard
        } else {
            UseCaseId::AdminRestartsJob
        };

        if self.local_jobs.release(job_id) {
            debug!(job_id = %job_id, "Stopped local execution before restart");
        }

        if hard {
            match self.machine.load(job_id).await {
                Ok(job) if !job.is_terminal() => self.cancel_remote_jobs(&job).await,
                _ => {}
            }
        }

        match self.machine.restart(job_id, hard).await {
            Ok(job) => {
                info!(use_case = %use_case, job_id = %job_id, hard, "Job restarted");
                self.events.publish(
                    MessageId::JobRestartTriggered,
                    EventPayload::JobRestart {
                        job_id,
                        hard,
                        info: None,
                    },
                );
                Ok(job)
            }
            Err(err @ TransitionError::AlreadyFinished { .. }) => {
                info!(use_case = %use_case, job_id = %job_id, "Restart canceled, job already finished");
                self.events.publish(
                    MessageId::JobRestartCanceled,
                    EventPayload::JobRestart {
                        job_id,
                        hard,
                        info: Some(err.to_string()),
                    },
                );
                Err(err)
            }
            Err(err @ TransitionError::NotFound(_)) => {
                info!(use_case = %use_case, job_id = %job_id, "Restart canceled, job not found");
                self.events.publish(
                    MessageId::JobRestartCanceled,
                    EventPayload::JobRestart {
                        job_id,
                        hard,
                        info: Some(RESTART_JOB_NOT_FOUND.to_string()),
                    },
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Suspends every job running on this instance and stops local execution
    ///
    /// Remote delegate jobs keep running; another instance reattaches to them
    /// after the jobs are resumed. Returns the number of suspended jobs.
    pub async fn shutdown(&self) -> usize {
        let job_ids = self.local_jobs.ids();
        info!(
            use_case = %UseCaseId::SystemSuspendsJobsOnShutdown,
            jobs = job_ids.len(),
            "Suspending local jobs"
        );

        self.shutdown.cancel();

        let mut suspended = 0;
        for job_id in job_ids {
            match self.machine.suspend(job_id).await {
                Ok(_) => suspended += 1,
                Err(TransitionError::InvalidTransition { from, .. }) => {
                    debug!(job_id = %job_id, state = %from, "Job not running, left as is");
                }
                Err(err) => warn!(job_id = %job_id, error = %err, "Failed to suspend job"),
            }
        }

        self.local_jobs.clear();
        suspended
    }

    /// Requeues jobs suspended for at least the minimum suspend time
    pub async fn resume_suspended(&self) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono_duration(self.resume_min_suspend);
        let suspended = self
            .machine
            .store()
            .find_by_states(&[JobState::Suspended], CHECK_BATCH_SIZE)
            .await?;

        let mut resumed = 0;
        for job in suspended {
            if job.suspended_at.is_some_and(|at| at > cutoff) {
                continue;
            }
            match self.machine.resume(job.id).await {
                Ok(_) => {
                    info!(
                        use_case = %UseCaseId::SystemResumesSuspendedJobs,
                        job_id = %job.id,
                        "Suspended job requeued"
                    );
                    resumed += 1;
                }
                Err(err) => debug!(job_id = %job.id, error = %err, "Resume skipped"),
            }
        }

        Ok(resumed)
    }

    /// Force cancels cancel requests nobody finished
    ///
    /// Applies to jobs not executed here whose request is older than twice the
    /// cancel timeout, i.e. the owning instance did not finish it in time.
    pub async fn sweep_orphaned_cancels(&self) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono_duration(self.cancel_timeout * 2);
        let pending = self
            .machine
            .store()
            .find_by_states(&[JobState::CancelRequested], CHECK_BATCH_SIZE)
            .await?;

        let mut canceled = 0;
        for job in pending {
            if self.local_jobs.contains(job.id) {
                continue;
            }
            if job.cancel_requested_at.is_some_and(|at| at > cutoff) {
                continue;
            }

            self.cancel_remote_jobs(&job).await;

            let message = JobMessage::warning(
                "Cancellation was not confirmed by the executing instance, job canceled",
            );
            match self.machine.confirm_canceled(job.id, message).await {
                Ok(_) => {
                    warn!(
                        use_case = %UseCaseId::SystemForceCancelsOrphanedJobs,
                        job_id = %job.id,
                        "Orphaned cancel request finished"
                    );
                    canceled += 1;
                }
                Err(err) => debug!(job_id = %job.id, error = %err, "Orphaned cancel skipped"),
            }
        }

        Ok(canceled)
    }

    /// Runs the system checks until shutdown, starting immediately
    pub async fn run_periodic_checks(&self) {
        info!(
            "Starting system checks (interval: {:?})",
            self.system_check_interval
        );
        let mut interval = tokio::time::interval(self.system_check_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("System checks stopped");
                    return;
                }
                _ = interval.tick() => self.check_once().await,
            }
        }
    }

    async fn check_once(&self) {
        match self.resume_suspended().await {
            Ok(0) => {}
            Ok(resumed) => info!("Resumed {} suspended job(s)", resumed),
            Err(e) => error!("Resume check failed: {}", e),
        }

        match self.sweep_orphaned_cancels().await {
            Ok(0) => {}
            Ok(canceled) => warn!("Force canceled {} orphaned job(s)", canceled),
            Err(e) => error!("Orphaned cancel check failed: {}", e),
        }
    }

    /// Best effort cancel of every unfinished remote job
    async fn cancel_remote_jobs(&self, job: &Job) {
        for reference in job
            .executor_jobs
            .iter()
            .filter(|reference| !reference.delegate_state.is_terminal())
        {
            let Some(executor) = self.profiles.executor_by_id(reference.executor_id) else {
                continue;
            };
            let Some(client) = self.delegates.client_for(executor.kind) else {
                continue;
            };
            if let Err(err) = client.cancel(&executor, reference.remote_job_id).await {
                warn!(
                    job_id = %job.id,
                    remote_job_id = %reference.remote_job_id,
                    error = %err,
                    "Remote cancel failed"
                );
            }
        }
    }
}
