//! Scheduler Config Repository
//!
//! The processing toggle lives in a single row so every instance of a
//! cluster sees the same value.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{SchedulerConfigStore, StoreError};

#[derive(Debug, Clone)]
pub struct PgSchedulerConfigStore {
    pool: PgPool,
}

impl PgSchedulerConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulerConfigStore for PgSchedulerConfigStore {
    async fn is_job_processing_enabled(&self) -> Result<bool, StoreError> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT job_processing_enabled FROM scheduler_config WHERE id = 0")
                .fetch_optional(&self.pool)
                .await?;

        Ok(enabled.unwrap_or(true))
    }

    async fn set_job_processing_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_config (id, job_processing_enabled)
            VALUES (0, $1)
            ON CONFLICT (id) DO UPDATE SET job_processing_enabled = EXCLUDED.job_processing_enabled
            "#,
        )
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
