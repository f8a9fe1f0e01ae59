//! Job Repository
//!
//! PostgreSQL implementation of the job record store. Optimistic locking
//! uses the `version` column: every update matches on the version read by the
//! caller and increments it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanward_core::domain::job::{Job, JobState};
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobStore, StoreError};

const JOB_COLUMNS: &str = r#"
    id, project_id, owner, state, version, configuration, created_at, started_at,
    ended_at, cancel_requested, cancel_requested_at, suspend_count, suspended_at,
    executed_by, uploads, executor_jobs, messages, result
"#;

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes a missing job from a version conflict after a failed update
    async fn conflict_error(&self, id: Uuid, expected: i64) -> StoreError {
        match self.find_by_id(id).await {
            Ok(Some(_)) => StoreError::Stale { id, expected },
            Ok(None) => StoreError::NotFound(id),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO scan_jobs (id, project_id, owner, state, version, configuration, created_at,
                                   started_at, ended_at, cancel_requested, cancel_requested_at,
                                   suspend_count, suspended_at, executed_by, uploads,
                                   executor_jobs, messages, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.project_id)
        .bind(&job.owner)
        .bind(job.state.as_str())
        .bind(job.version)
        .bind(serde_json::to_value(&job.configuration)?)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.ended_at)
        .bind(job.cancel_requested)
        .bind(job.cancel_requested_at)
        .bind(job.suspend_count as i32)
        .bind(job.suspended_at)
        .bind(&job.executed_by)
        .bind(serde_json::to_value(&job.uploads)?)
        .bind(serde_json::to_value(&job.executor_jobs)?)
        .bind(serde_json::to_value(&job.messages)?)
        .bind(job.result.as_ref().map(serde_json::to_value).transpose()?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(job.id));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM scan_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: JobState,
    ) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE scan_jobs
            SET state = $1, version = version + 1
            WHERE id = $2 AND version = $3
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(new_state.as_str())
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.conflict_error(id, expected_version).await),
        }
    }

    async fn save(&self, job: &Job) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE scan_jobs
            SET state = $1, version = version + 1, started_at = $2, ended_at = $3,
                cancel_requested = $4, cancel_requested_at = $5, suspend_count = $6,
                suspended_at = $7, executed_by = $8, uploads = $9, executor_jobs = $10,
                messages = $11, result = $12
            WHERE id = $13 AND version = $14
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job.state.as_str())
        .bind(job.started_at)
        .bind(job.ended_at)
        .bind(job.cancel_requested)
        .bind(job.cancel_requested_at)
        .bind(job.suspend_count as i32)
        .bind(job.suspended_at)
        .bind(&job.executed_by)
        .bind(serde_json::to_value(&job.uploads)?)
        .bind(serde_json::to_value(&job.executor_jobs)?)
        .bind(serde_json::to_value(&job.messages)?)
        .bind(job.result.as_ref().map(serde_json::to_value).transpose()?)
        .bind(job.id)
        .bind(job.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.conflict_error(job.id, job.version).await),
        }
    }

    async fn count_by_state(&self, state: JobState) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_jobs WHERE state = $1")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn find_by_states(
        &self,
        states: &[JobState],
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let states: Vec<&str> = states.iter().map(|state| state.as_str()).collect();

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {}
            FROM scan_jobs
            WHERE state = ANY($1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            JOB_COLUMNS
        ))
        .bind(states)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM scan_jobs ORDER BY created_at DESC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let terminal: Vec<&str> = JobState::ALL
            .iter()
            .filter(|state| state.is_terminal())
            .map(|state| state.as_str())
            .collect();

        let ids = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM scan_jobs WHERE created_at < $1 AND state = ANY($2) RETURNING id",
        )
        .bind(cutoff)
        .bind(terminal)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    project_id: String,
    owner: String,
    state: String,
    version: i64,
    configuration: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    cancel_requested: bool,
    cancel_requested_at: Option<DateTime<Utc>>,
    suspend_count: i32,
    suspended_at: Option<DateTime<Utc>>,
    executed_by: Option<String>,
    uploads: serde_json::Value,
    executor_jobs: serde_json::Value,
    messages: serde_json::Value,
    result: Option<serde_json::Value>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|e| StoreError::Corrupt(format!("job {}: {}", row.id, e)))?;

        Ok(Job {
            id: row.id,
            project_id: row.project_id,
            owner: row.owner,
            state,
            version: row.version,
            configuration: serde_json::from_value(row.configuration)?,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            cancel_requested: row.cancel_requested,
            cancel_requested_at: row.cancel_requested_at,
            suspend_count: row.suspend_count.max(0) as u32,
            suspended_at: row.suspended_at,
            executed_by: row.executed_by,
            uploads: serde_json::from_value(row.uploads)?,
            executor_jobs: serde_json::from_value(row.executor_jobs)?,
            messages: serde_json::from_value(row.messages)?,
            result: row.result.map(serde_json::from_value).transpose()?,
        })
    }
}
