//! In-memory stores
//!
//! Used when no database is configured and by tests. Versioning behaves
//! exactly like the PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanward_core::domain::job::{Job, JobState};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::{JobStore, SchedulerConfigStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        Ok(jobs.get(&id).cloned())
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: JobState,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        let stored = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if stored.version != expected_version {
            return Err(StoreError::Stale {
                id,
                expected: expected_version,
            });
        }
        stored.state = new_state;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn save(&self, job: &Job) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        let stored = jobs.get_mut(&job.id).ok_or(StoreError::NotFound(job.id))?;
        if stored.version != job.version {
            return Err(StoreError::Stale {
                id: job.id,
                expected: job.version,
            });
        }
        let mut updated = job.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn count_by_state(&self, state: JobState) -> Result<u64, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        Ok(jobs.values().filter(|job| job.state == state).count() as u64)
    }

    async fn find_by_states(
        &self,
        states: &[JobState],
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| states.contains(&job.state))
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.is_terminal() && job.created_at < cutoff)
            .map(|job| job.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        Ok(expired)
    }
}

#[derive(Debug)]
pub struct InMemorySchedulerConfigStore {
    job_processing_enabled: AtomicBool,
}

impl InMemorySchedulerConfigStore {
    pub fn new(job_processing_enabled: bool) -> Self {
        Self {
            job_processing_enabled: AtomicBool::new(job_processing_enabled),
        }
    }
}

impl Default for InMemorySchedulerConfigStore {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl SchedulerConfigStore for InMemorySchedulerConfigStore {
    async fn is_job_processing_enabled(&self) -> Result<bool, StoreError> {
        Ok(self.job_processing_enabled.load(Ordering::SeqCst))
    }

    async fn set_job_processing_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.job_processing_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}
