//! Repository Module
//!
//! Data access layer for the scheduler. The durable job record store and the
//! cluster wide scheduler settings are traits with a PostgreSQL
//! implementation for clusters and an in-memory one for single instances
//! and tests.

pub mod job;
pub mod memory;
pub mod scheduler_config;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanward_core::domain::job::{Job, JobState};
use thiserror::Error;
use uuid::Uuid;

pub use job::PgJobStore;
pub use memory::{InMemoryJobStore, InMemorySchedulerConfigStore};
pub use scheduler_config::PgSchedulerConfigStore;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),

    /// The stored version differs from the one the caller read
    #[error("Job {id} was modified concurrently (expected version {expected})")]
    Stale { id: Uuid, expected: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_stale(&self) -> bool {
        matches!(self, StoreError::Stale { .. })
    }
}

/// Durable job record store
///
/// Every write is version checked: a write based on an outdated read fails
/// with [`StoreError::Stale`] and leaves the record untouched. A successful
/// write returns the record with its version incremented.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Changes only the state, if the stored version is `expected_version`
    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: JobState,
    ) -> Result<Job, StoreError>;

    /// Writes the whole record, if the stored version is `job.version`
    async fn save(&self, job: &Job) -> Result<Job, StoreError>;

    async fn count_by_state(&self, state: JobState) -> Result<u64, StoreError>;

    /// Jobs in any of `states`, oldest first
    async fn find_by_states(&self, states: &[JobState], limit: usize)
    -> Result<Vec<Job>, StoreError>;

    /// All jobs, newest first
    async fn list_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Deletes finished jobs created before `cutoff` and returns their ids
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}

/// Cluster wide scheduler settings
#[async_trait]
pub trait SchedulerConfigStore: Send + Sync {
    async fn is_job_processing_enabled(&self) -> Result<bool, StoreError>;

    async fn set_job_processing_enabled(&self, enabled: bool) -> Result<(), StoreError>;
}
