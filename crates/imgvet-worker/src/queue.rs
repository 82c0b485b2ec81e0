//! Job queue: worker pool, LISTEN/NOTIFY or polling, retry, and submission.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop; it does not wait
//! for in-flight jobs. For graceful shutdown, coordinate with your runtime and
//! allow time for running jobs to finish before process exit.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use imgvet_core::models::{Job, JobType};
use imgvet_core::{JobError, JobStore, QueueConfig};

use crate::context::JobHandlerContext;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new job is created.
pub const JOB_NOTIFY_CHANNEL: &str = "imgvet_new_job";

/// Maximum delay in seconds before retrying a failed job. Caps exponential
/// backoff so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    (2_u64.pow(retry_count as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create a new JobQueue with a weak reference to the dispatch context.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake
    /// immediately when jobs are created, in addition to polling at
    /// `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        store: Arc<dyn JobStore>,
        config: QueueConfig,
        context: Weak<dyn JobHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let store_clone = store.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(store_clone, config_clone, context, shutdown_rx, pool).await;
        });

        Self {
            store,
            config,
            shutdown_tx,
        }
    }

    /// Submit a new job to the queue.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit(
        &self,
        corr_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> Result<Uuid> {
        let job = self
            .store
            .enqueue(
                corr_id,
                job_type,
                payload,
                self.config.max_retries,
                Some(self.config.default_timeout_seconds),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    corr_id = %corr_id,
                    job_type = %job_type,
                    "Failed to enqueue job"
                );
                anyhow::anyhow!("Failed to enqueue job: {}", e)
            })?;

        tracing::info!(
            job_id = %job.id,
            corr_id = %corr_id,
            channel = job_type.channel(),
            "Job submitted to queue"
        );

        Ok(job.id)
    }

    async fn worker_pool(
        store: Arc<dyn JobStore>,
        config: QueueConfig,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY
        // (avoids blocking on recv when no pool).
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&store, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&store, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        store: &Arc<dyn JobStore>,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn JobHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match store.claim_next().await {
            Ok(Some(job)) => {
                let store = store.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_job_with_retry(job, store, ctx).await {
                        tracing::error!(error = %e, "Job processing failed after retries");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(skip(store, context), fields(job.id = %job.id, job.channel = job.job_type.channel()))]
    async fn process_job_with_retry(
        job: Job,
        store: Arc<dyn JobStore>,
        context: Weak<dyn JobHandlerContext>,
    ) -> Result<()> {
        let ctx = context
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("JobHandlerContext was dropped, cannot process job"))?;

        let timeout_duration = job
            .timeout_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(Duration::from_secs(300));

        let result = tokio::time::timeout(timeout_duration, ctx.dispatch_job(&job)).await;

        match result {
            Ok(Ok(job_result)) => {
                store
                    .mark_completed(job.id, job_result)
                    .await
                    .context("Failed to mark job as completed")?;
                tracing::info!(
                    job_id = %job.id,
                    corr_id = %job.corr_id,
                    "Job completed successfully"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                // An unrecoverable JobError means the outcome is settled
                // (e.g. the artifact was quarantined); retrying cannot help.
                let is_unrecoverable = e
                    .downcast_ref::<JobError>()
                    .map(|je| !je.is_recoverable())
                    .unwrap_or(false);

                tracing::error!(
                    job_id = %job.id,
                    corr_id = %job.corr_id,
                    error = %e,
                    retry_count = job.retry_count,
                    max_retries = job.max_retries,
                    unrecoverable = is_unrecoverable,
                    "Job execution failed"
                );

                if is_unrecoverable {
                    let error_result = json!({
                        "error": e.to_string(),
                        "retry_count": job.retry_count,
                        "unrecoverable": true,
                    });
                    store
                        .mark_failed(job.id, error_result)
                        .await
                        .context("Failed to mark job as failed")?;
                    return Err(e);
                }

                if job.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(job.retry_count);
                    tracing::info!(
                        job_id = %job.id,
                        retry_count = job.retry_count + 1,
                        backoff_seconds = backoff_seconds,
                        "Scheduling job retry"
                    );
                    store.schedule_retry(job.id, backoff_seconds).await?;
                    Ok(())
                } else {
                    let error_result = json!({
                        "error": e.to_string(),
                        "retry_count": job.retry_count,
                        "reason": "Job failed after maximum retries"
                    });
                    store
                        .mark_failed(job.id, error_result)
                        .await
                        .context("Failed to mark job as failed")?;
                    tracing::error!(job_id = %job.id, "Job failed after max retries");
                    Err(e)
                }
            }
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_seconds = ?job.timeout_seconds,
                    "Job execution timed out"
                );
                if job.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(job.retry_count);
                    store.schedule_retry(job.id, backoff_seconds).await?;
                    Ok(())
                } else {
                    let error_result = json!({
                        "error": "Job execution timed out",
                        "timeout_seconds": job.timeout_seconds,
                    });
                    store.mark_failed(job.id, error_result).await?;
                    Err(anyhow::anyhow!("Job execution timed out"))
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming new jobs and exit the main
    /// loop. Returns immediately; already-spawned handlers continue until they
    /// complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(10), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn unrecoverable_job_error_detected() {
        let err: anyhow::Error = JobError::unrecoverable(anyhow::anyhow!("quarantined")).into();
        let is_unrecoverable = err
            .downcast_ref::<JobError>()
            .map(|je| !je.is_recoverable())
            .unwrap_or(false);
        assert!(is_unrecoverable);
    }

    #[test]
    fn non_job_error_treated_as_recoverable() {
        let err: anyhow::Error = anyhow::anyhow!("generic error");
        let is_unrecoverable = err
            .downcast_ref::<JobError>()
            .map(|je| !je.is_recoverable())
            .unwrap_or(false);
        assert!(!is_unrecoverable);
    }
}
