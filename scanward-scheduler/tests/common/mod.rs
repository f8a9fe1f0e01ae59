//! Shared fixtures for scheduler scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanward_client::{ClientError, DelegateClient, RemoteJobRequest};
use scanward_core::domain::executor::{DelegateState, ExecutorConfig, ExecutorKind, ResultFormat};
use scanward_core::domain::job::{Job, JobConfiguration, JobState, ScanType};
use scanward_core::domain::message::JobMessage;
use scanward_core::domain::profile::{ExecutionProfile, ProjectSettings};
use scanward_core::dto::job::CreateJobRequest;
use scanward_scheduler::Scheduler;
use scanward_scheduler::config::Config;
use scanward_scheduler::repository::{
    InMemoryJobStore, InMemorySchedulerConfigStore, JobStore, SchedulerConfigStore, StoreError,
};
use scanward_scheduler::service::profiles::ProfileDocument;
use scanward_scheduler::service::{
    DelegateRegistry, StaticProfileResolver, SystemLoad, SystemMonitor,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const PROJECT: &str = "alpha";

/// Scripted product delegate
///
/// Remote jobs start in `start_state`; tests move them with [`FakeDelegate::set_all`].
pub struct FakeDelegate {
    start_state: DelegateState,
    confirm_cancel: bool,
    states: Mutex<HashMap<Uuid, DelegateState>>,
    results: Mutex<HashMap<String, String>>,
    pub starts: AtomicUsize,
    pub cancels: AtomicUsize,
}

impl FakeDelegate {
    pub fn new(start_state: DelegateState) -> Arc<Self> {
        Arc::new(Self {
            start_state,
            confirm_cancel: true,
            states: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        })
    }

    /// Delegate that never reports a cancel as done
    pub fn ignoring_cancel(start_state: DelegateState) -> Arc<Self> {
        Arc::new(Self {
            start_state,
            confirm_cancel: false,
            states: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        })
    }

    pub fn set_all(&self, state: DelegateState) {
        for value in self.states.lock().unwrap().values_mut() {
            *value = state;
        }
    }

    pub fn set_result(&self, executor_name: &str, raw: &str) {
        self.results
            .lock()
            .unwrap()
            .insert(executor_name.to_string(), raw.to_string());
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelegateClient for FakeDelegate {
    async fn start_remote_job(
        &self,
        _executor: &ExecutorConfig,
        _request: &RemoteJobRequest,
    ) -> Result<Uuid, ClientError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let remote_job_id = Uuid::new_v4();
        self.states
            .lock()
            .unwrap()
            .insert(remote_job_id, self.start_state);
        Ok(remote_job_id)
    }

    async fn poll_status(
        &self,
        _executor: &ExecutorConfig,
        remote_job_id: Uuid,
    ) -> Result<DelegateState, ClientError> {
        self.states
            .lock()
            .unwrap()
            .get(&remote_job_id)
            .copied()
            .ok_or_else(|| ClientError::ApiError {
                status: 404,
                message: "unknown job".to_string(),
            })
    }

    async fn cancel(&self, _executor: &ExecutorConfig, remote_job_id: Uuid) -> Result<(), ClientError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.confirm_cancel {
            self.states
                .lock()
                .unwrap()
                .insert(remote_job_id, DelegateState::Canceled);
        }
        Ok(())
    }

    async fn fetch_result(
        &self,
        executor: &ExecutorConfig,
        _remote_job_id: Uuid,
    ) -> Result<String, ClientError> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(&executor.name)
            .cloned()
            .unwrap_or_else(|| "name=Finding\nseverity=high\n".to_string()))
    }

    async fn fetch_messages(
        &self,
        _executor: &ExecutorConfig,
        _remote_job_id: Uuid,
    ) -> Result<Vec<JobMessage>, ClientError> {
        Ok(Vec::new())
    }
}

/// Job store counting deletions
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryJobStore,
    pub deletes: AtomicUsize,
}

#[async_trait]
impl JobStore for CountingStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: JobState,
    ) -> Result<Job, StoreError> {
        self.inner
            .compare_and_swap_state(id, expected_version, new_state)
            .await
    }

    async fn save(&self, job: &Job) -> Result<Job, StoreError> {
        self.inner.save(job).await
    }

    async fn count_by_state(&self, state: JobState) -> Result<u64, StoreError> {
        self.inner.count_by_state(state).await
    }

    async fn find_by_states(&self, states: &[JobState], limit: usize) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_states(states, limit).await
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_all().await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_older_than(cutoff).await
    }
}

/// Job store that holds the next state swap until released
#[derive(Default)]
pub struct GatedStore {
    inner: InMemoryJobStore,
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStore {
    /// Blocks the next `compare_and_swap_state` call
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for GatedStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create(job).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: JobState,
    ) -> Result<Job, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner
            .compare_and_swap_state(id, expected_version, new_state)
            .await
    }

    async fn save(&self, job: &Job) -> Result<Job, StoreError> {
        self.inner.save(job).await
    }

    async fn count_by_state(&self, state: JobState) -> Result<u64, StoreError> {
        self.inner.count_by_state(state).await
    }

    async fn find_by_states(&self, states: &[JobState], limit: usize) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_states(states, limit).await
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_all().await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        self.inner.delete_older_than(cutoff).await
    }
}

/// Monitor reporting a constant host load
pub struct FixedLoad(pub SystemLoad);

impl FixedLoad {
    pub fn idle() -> Self {
        Self(SystemLoad {
            cpu_load: 0.1,
            memory_percent: 20.0,
        })
    }
}

impl SystemMonitor for FixedLoad {
    fn sample(&self) -> SystemLoad {
        self.0
    }
}

pub fn executor(name: &str, format: ResultFormat) -> ExecutorConfig {
    ExecutorConfig {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: ExecutorKind::Pds,
        scan_type: ScanType::CodeScan,
        product_id: format!("PDS_{}", name.to_uppercase()),
        base_url: "http://delegate.test".to_string(),
        result_format: format,
        enabled: true,
        parameters: BTreeMap::new(),
    }
}

pub fn profiles(executors: Vec<ExecutorConfig>) -> StaticProfileResolver {
    StaticProfileResolver::new(ProfileDocument {
        profiles: vec![ExecutionProfile {
            id: "default".to_string(),
            description: None,
            enabled: true,
            executors,
            project_ids: BTreeSet::from([PROJECT.to_string()]),
        }],
        projects: vec![ProjectSettings {
            id: PROJECT.to_string(),
            whitelist: Vec::new(),
        }],
    })
}

pub fn config(instance_id: &str, upload_dir: &std::path::Path) -> Config {
    let mut config = Config::new(instance_id.to_string());
    config.trigger_initial_delay = Duration::ZERO;
    config.trigger_delay = Duration::from_millis(50);
    config.claim_max_wait = Duration::from_millis(30);
    config.poll_interval = Duration::from_millis(20);
    config.poll_timeout = Duration::from_secs(10);
    config.cancel_timeout = Duration::from_secs(5);
    config.resume_min_suspend = Duration::ZERO;
    config.upload_dir = upload_dir.to_path_buf();
    config
}

/// Scheduler instance sharing the given stores
pub fn scheduler(
    config: Config,
    store: Arc<dyn JobStore>,
    settings: Arc<dyn SchedulerConfigStore>,
    profiles: StaticProfileResolver,
    delegate: Arc<FakeDelegate>,
) -> Scheduler {
    scheduler_with_monitor(config, store, settings, profiles, delegate, FixedLoad::idle())
}

pub fn scheduler_with_monitor(
    config: Config,
    store: Arc<dyn JobStore>,
    settings: Arc<dyn SchedulerConfigStore>,
    profiles: StaticProfileResolver,
    delegate: Arc<FakeDelegate>,
    monitor: FixedLoad,
) -> Scheduler {
    Scheduler::build(
        config,
        store,
        settings,
        Arc::new(profiles),
        DelegateRegistry::with_delegate_protocol(delegate),
        Arc::new(monitor),
    )
}

pub fn single_scheduler(
    config: Config,
    profiles: StaticProfileResolver,
    delegate: Arc<FakeDelegate>,
) -> Scheduler {
    scheduler(
        config,
        Arc::new(InMemoryJobStore::new()),
        Arc::new(InMemorySchedulerConfigStore::default()),
        profiles,
        delegate,
    )
}

/// Creates a code scan job and marks it ready
pub async fn ready_job(scheduler: &Scheduler) -> Job {
    let job = scheduler
        .jobs
        .create_job(CreateJobRequest {
            project_id: PROJECT.to_string(),
            owner: "alice".to_string(),
            configuration: JobConfiguration {
                scan_types: vec![ScanType::CodeScan],
                ..Default::default()
            },
        })
        .await
        .unwrap();
    scheduler.jobs.mark_ready(job.id).await.unwrap()
}

/// Polls the store until the predicate holds
pub async fn wait_for(scheduler: &Scheduler, job_id: Uuid, predicate: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..500 {
        let job = scheduler.jobs.get_job(job_id).await.unwrap();
        if predicate(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let job = scheduler.jobs.get_job(job_id).await.unwrap();
    panic!("condition not reached, job is {:?}", job.state);
}

pub async fn wait_for_state(scheduler: &Scheduler, job_id: Uuid, state: JobState) -> Job {
    wait_for(scheduler, job_id, |job| job.state == state).await
}
