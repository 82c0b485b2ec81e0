use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use imgvet_core::models::{Job, JobStatus, JobType};
use imgvet_core::{AppError, JobStore};

/// In-memory job store for tests and single-process deployments.
///
/// Claim ordering matches the Postgres store: earliest `scheduled_at` among
/// due pending/scheduled jobs wins.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Job>>, AppError> {
        self.jobs
            .lock()
            .map_err(|_| AppError::Internal("job store lock poisoned".to_string()))
    }

    /// Number of jobs not yet in a terminal state. Used by tests to drain
    /// the queue deterministically.
    pub fn open_jobs(&self) -> usize {
        self.jobs
            .lock()
            .map(|jobs| {
                jobs.values()
                    .filter(|j| {
                        !matches!(j.status, JobStatus::Completed | JobStatus::Failed)
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        corr_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Job, AppError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            corr_id,
            job_type,
            status: JobStatus::Pending,
            payload,
            result: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            timeout_seconds,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>, AppError> {
        let now = Utc::now();
        let mut jobs = self.lock()?;

        let next_id = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Scheduled)
                    && j.scheduled_at <= now
            })
            .min_by_key(|j| j.scheduled_at)
            .map(|j| j.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).ok_or_else(|| {
            AppError::Internal("claimed job vanished from store".to_string())
        })?;
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), AppError> {
        let mut jobs = self.lock()?;
        if let Some(job) = jobs.get_mut(&job_id) {
            let now = Utc::now();
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.completed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, result: serde_json::Value) -> Result<(), AppError> {
        let mut jobs = self.lock()?;
        if let Some(job) = jobs.get_mut(&job_id) {
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.result = Some(result);
            job.completed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn schedule_retry(&self, job_id: Uuid, backoff_seconds: u64) -> Result<Job, AppError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("No job {}", job_id)))?;

        let now = Utc::now();
        job.status = JobStatus::Scheduled;
        job.retry_count += 1;
        job.scheduled_at = now + ChronoDuration::seconds(backoff_seconds as i64);
        job.started_at = None;
        job.updated_at = now;
        Ok(job.clone())
    }
}
