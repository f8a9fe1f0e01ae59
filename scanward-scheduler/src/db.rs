use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_jobs (
            id UUID PRIMARY KEY,
            project_id VARCHAR(255) NOT NULL,
            owner VARCHAR(255) NOT NULL,
            state VARCHAR(32) NOT NULL,
            version BIGINT NOT NULL DEFAULT 0,
            configuration JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            ended_at TIMESTAMPTZ,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            cancel_requested_at TIMESTAMPTZ,
            suspend_count INTEGER NOT NULL DEFAULT 0,
            suspended_at TIMESTAMPTZ,
            executed_by VARCHAR(255),
            uploads JSONB NOT NULL DEFAULT '[]',
            executor_jobs JSONB NOT NULL DEFAULT '[]',
            messages JSONB NOT NULL DEFAULT '[]',
            result JSONB
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for dispatch and cleanup queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_jobs_state ON scan_jobs(state, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_jobs_created_at ON scan_jobs(created_at)")
        .execute(pool)
        .await?;

    // Create scheduler config table, a single row shared by the cluster
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_config (
            id INTEGER PRIMARY KEY,
            job_processing_enabled BOOLEAN NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO scheduler_config (id, job_processing_enabled) VALUES (0, TRUE) ON CONFLICT (id) DO NOTHING",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
