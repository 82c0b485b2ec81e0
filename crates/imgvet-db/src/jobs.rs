use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

use imgvet_core::models::{Job, JobStatus, JobType};
use imgvet_core::{AppError, JobStore};

/// Postgres NOTIFY channel workers listen on for instant wakeup.
pub const NEW_JOB_CHANNEL: &str = "imgvet_new_job";

const JOB_COLUMNS: &str = r#"
    id,
    corr_id,
    job_type,
    status,
    payload,
    result,
    scheduled_at,
    started_at,
    completed_at,
    retry_count,
    max_retries,
    timeout_seconds,
    created_at,
    updated_at
"#;

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    corr_id: Uuid,
    job_type: String,
    status: String,
    payload: serde_json::Value,
    result: Option<serde_json::Value>,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    timeout_seconds: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, AppError> {
        Ok(Job {
            id: self.id,
            corr_id: self.corr_id,
            job_type: JobType::from_str(&self.job_type)?,
            status: JobStatus::from_str(&self.status)?,
            payload: self.payload,
            result: self.result,
            scheduled_at: self.scheduled_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            timeout_seconds: self.timeout_seconds,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(
        &self,
        corr_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Job, AppError> {
        // Insert and notify atomically so a worker woken by the NOTIFY is
        // guaranteed to see the committed row.
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO jobs (corr_id, job_type, status, payload, max_retries, timeout_seconds)
            VALUES ($1, $2, 'pending', $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row: JobRow = sqlx::query_as::<Postgres, JobRow>(&query)
            .bind(corr_id)
            .bind(job_type.to_string())
            .bind(payload)
            .bind(max_retries)
            .bind(timeout_seconds)
            .fetch_one(&mut *tx)
            .await?;

        // Non-fatal: workers fall back to polling if LISTEN/NOTIFY fails.
        if let Err(e) = sqlx::query(&format!("SELECT pg_notify('{NEW_JOB_CHANNEL}', '')"))
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                job_id = %row.id,
                "Failed to send pg_notify for new job, workers will discover it via polling"
            );
        }

        tx.commit().await?;

        tracing::info!(
            job_id = %row.id,
            corr_id = %corr_id,
            job_type = %job_type,
            "Job enqueued"
        );
        row.into_job()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<Job>, AppError> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status IN ('pending', 'scheduled')
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        );
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&select)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let update = format!(
            r#"
            UPDATE jobs
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        let claimed: JobRow = sqlx::query_as::<Postgres, JobRow>(&update)
            .bind(row.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        claimed.into_job().map(Some)
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(result)
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id = %job_id, "Job completed");
        Ok(())
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_failed(&self, job_id: Uuid, result: serde_json::Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(result)
        .execute(&self.pool)
        .await?;

        tracing::warn!(job_id = %job_id, "Job failed permanently");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn schedule_retry(&self, job_id: Uuid, backoff_seconds: u64) -> Result<Job, AppError> {
        let query = format!(
            r#"
            UPDATE jobs
            SET status = 'scheduled',
                retry_count = retry_count + 1,
                scheduled_at = NOW() + make_interval(secs => $2),
                started_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row: JobRow = sqlx::query_as::<Postgres, JobRow>(&query)
            .bind(job_id)
            .bind(backoff_seconds as f64)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            job_id = %job_id,
            retry_count = row.retry_count,
            max_retries = row.max_retries,
            backoff_seconds,
            "Job retry scheduled"
        );
        row.into_job()
    }
}
