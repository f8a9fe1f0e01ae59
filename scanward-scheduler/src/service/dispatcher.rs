//! Dispatcher
//!
//! Periodic trigger that picks waiting jobs in creation order and launches
//! them on this instance. Several instances may trigger against the same
//! store: the version checked claim decides who runs a job, losing the race
//! is not an error.

use rand::Rng;
use scanward_core::domain::job::{Job, JobState};
use scanward_core::usecase::UseCaseId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::{SchedulerConfigStore, StoreError};
use crate::service::execution::JobRunner;
use crate::service::health::{HealthCheck, SystemMonitor};
use crate::service::state_machine::{JobStateMachine, TransitionError};
use crate::service::tracker::LocalJobs;

const MIN_CLAIM_WAIT_MS: u64 = 10;

pub struct Dispatcher {
    machine: Arc<JobStateMachine>,
    settings: Arc<dyn SchedulerConfigStore>,
    runner: Arc<JobRunner>,
    local_jobs: Arc<LocalJobs>,
    health: Option<HealthCheck>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    instance_id: String,
    batch_size: usize,
    claim_retries: u32,
    claim_max_wait: Duration,
    trigger_initial_delay: Duration,
    trigger_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        machine: Arc<JobStateMachine>,
        settings: Arc<dyn SchedulerConfigStore>,
        runner: Arc<JobRunner>,
        local_jobs: Arc<LocalJobs>,
        monitor: Arc<dyn SystemMonitor>,
        shutdown: CancellationToken,
    ) -> Self {
        let health = config.health_check_enabled.then(|| {
            HealthCheck::new(monitor, config.max_cpu_load, config.max_memory_percent)
        });

        Self {
            machine,
            settings,
            runner,
            local_jobs,
            health,
            permits: Arc::new(Semaphore::new(config.max_parallel_jobs)),
            shutdown,
            instance_id: config.instance_id.clone(),
            batch_size: config.batch_size,
            claim_retries: config.claim_retries,
            claim_max_wait: config.claim_max_wait,
            trigger_initial_delay: config.trigger_initial_delay,
            trigger_delay: config.trigger_delay,
        }
    }

    /// Trigger loop, ends on shutdown
    pub async fn run(&self) {
        info!(
            "Starting dispatcher (initial delay: {:?}, delay: {:?})",
            self.trigger_initial_delay, self.trigger_delay
        );

        let start = tokio::time::Instant::now() + self.trigger_initial_delay;
        let mut interval = tokio::time::interval_at(start, self.trigger_delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Dispatcher stopped");
                    return;
                }
                _ = interval.tick() => {
                    match self.trigger_once().await {
                        Ok(0) => debug!("No jobs launched this cycle"),
                        Ok(launched) => info!("Launched {} job(s) this cycle", launched),
                        Err(e) => error!("Error during trigger cycle: {}", e),
                    }
                }
            }
        }
    }

    /// Performs a single trigger cycle, returns the number of launched jobs
    pub async fn trigger_once(&self) -> Result<usize, StoreError> {
        if self.shutdown.is_cancelled() {
            debug!("Instance is terminating, trigger skipped");
            return Ok(0);
        }

        if !self.settings.is_job_processing_enabled().await? {
            debug!("Job processing disabled, trigger skipped");
            return Ok(0);
        }

        if let Some(overload) = self.health.as_ref().and_then(HealthCheck::overload) {
            warn!(instance_id = %self.instance_id, %overload, "Job processing is skipped");
            return Ok(0);
        }

        let candidates = self
            .machine
            .store()
            .find_by_states(&[JobState::ReadyToStart, JobState::Queued], self.batch_size)
            .await?;

        let mut launched = 0;
        for candidate in candidates {
            if self.local_jobs.contains(candidate.id) {
                continue;
            }

            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!("Max parallel jobs reached, remaining jobs wait for the next cycle");
                break;
            };

            let Some(guard) = self.local_jobs.register(candidate.id, &self.shutdown) else {
                continue;
            };

            let Some(job) = self.claim_with_retries(candidate).await else {
                continue;
            };

            // Shutdown may have swept local jobs while the claim was in flight
            if self.shutdown.is_cancelled() {
                self.suspend_claimed(job.id).await;
                break;
            }

            let runner = Arc::clone(&self.runner);
            let token = guard.token().clone();
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                runner.run(job, token).await;
            });
            launched += 1;
        }

        Ok(launched)
    }

    /// Claims and starts a job, retrying lost races with a random wait
    async fn claim_with_retries(&self, candidate: Job) -> Option<Job> {
        let job_id = candidate.id;
        let mut current = candidate;

        for attempt in 0..=self.claim_retries {
            let result = match current.state {
                JobState::ReadyToStart => match self.machine.claim(job_id, current.version).await {
                    Ok(queued) => {
                        self.machine
                            .start(job_id, queued.version, &self.instance_id)
                            .await
                    }
                    Err(err) => Err(err),
                },
                JobState::Queued => {
                    self.machine
                        .start(job_id, current.version, &self.instance_id)
                        .await
                }
                other => {
                    debug!(job_id = %job_id, state = %other, "Job is no longer waiting");
                    return None;
                }
            };

            match result {
                Ok(job) => {
                    info!(
                        use_case = %UseCaseId::SchedulerStartsJob,
                        job_id = %job_id,
                        instance_id = %self.instance_id,
                        "Job claimed"
                    );
                    return Some(job);
                }
                Err(err) if err.is_stale() => {
                    if attempt == self.claim_retries {
                        break;
                    }
                    let wait = self.random_claim_wait();
                    debug!(job_id = %job_id, attempt, ?wait, "Claim lost, retrying");
                    tokio::time::sleep(wait).await;

                    current = match self.machine.load(job_id).await {
                        Ok(job) => job,
                        Err(err) => {
                            debug!(job_id = %job_id, error = %err, "Job vanished while claiming");
                            return None;
                        }
                    };
                }
                Err(
                    err @ (TransitionError::InvalidTransition { .. }
                    | TransitionError::InvalidState { .. }
                    | TransitionError::NotFound(_)),
                ) => {
                    debug!(job_id = %job_id, error = %err, "Job taken by another instance");
                    return None;
                }
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "Claiming job failed");
                    return None;
                }
            }
        }

        warn!(
            job_id = %job_id,
            retries = self.claim_retries,
            "Giving up claim after concurrent modifications"
        );
        None
    }

    async fn suspend_claimed(&self, job_id: Uuid) {
        match self.machine.suspend(job_id).await {
            Ok(_) => info!(
                use_case = %UseCaseId::SystemSuspendsJobsOnShutdown,
                job_id = %job_id,
                "Job claimed while terminating, suspended"
            ),
            Err(TransitionError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job_id, state = %from, "Claimed job already left RUNNING");
            }
            Err(err) => warn!(job_id = %job_id, error = %err, "Failed to suspend claimed job"),
        }
    }

    /// Random wait in `[10ms, claim_max_wait)` so cluster members drift apart
    fn random_claim_wait(&self) -> Duration {
        let max = (self.claim_max_wait.as_millis() as u64).max(MIN_CLAIM_WAIT_MS + 1);
        Duration::from_millis(rand::rng().random_range(MIN_CLAIM_WAIT_MS..max))
    }
}
