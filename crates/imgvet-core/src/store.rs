//! Adapter contracts for the status store and job store.
//!
//! The pipeline never talks to a concrete database or queue; stages
//! coordinate exclusively through these traits. Postgres implementations
//! live in `imgvet-db`; an in-memory job store lives in `imgvet-worker`.
//!
//! Both stores must serialize per-key writes. Status writes are
//! overwrite-with-timestamp and must tolerate concurrent retries of the
//! same message; [`StatusStore::transition`] enforces the state machine so
//! no caller can write a record backward.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Finding, Job, JobType, PipelineStatus, StatusLinks, StatusRecord};

/// Keyed store of [`StatusRecord`]s, the single source of truth read by
/// polling clients. Last-writer-wins per corrId, transitions checked against
/// the state machine.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create the initial `received` record for a newly accepted upload.
    async fn create(&self, corr_id: Uuid) -> Result<StatusRecord, AppError>;

    /// Read a record, or `None` for an unknown corrId.
    async fn get(&self, corr_id: Uuid) -> Result<Option<StatusRecord>, AppError>;

    /// Move a record to `next`, replacing findings/links when given.
    ///
    /// Returns [`AppError::InvalidTransition`] when the edge is not in the
    /// state machine and [`AppError::NotFound`] for an unknown corrId.
    /// Same-state writes succeed and only refresh the timestamp, keeping
    /// redelivered messages idempotent.
    async fn transition(
        &self,
        corr_id: Uuid,
        next: PipelineStatus,
        findings: Option<Vec<Finding>>,
        links: Option<StatusLinks>,
    ) -> Result<StatusRecord, AppError>;
}

/// At-least-once job store backing the stage queue.
///
/// `claim_next` hands a due job to exactly one worker (store-side locking);
/// a claimed job that is neither completed nor failed is redelivered via
/// `schedule_retry`. Ordering across correlation ids is not guaranteed.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job carrying a stage message payload.
    async fn enqueue(
        &self,
        corr_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Job, AppError>;

    /// Claim the next due job, marking it running. `None` when the queue is
    /// empty or nothing is due yet.
    async fn claim_next(&self) -> Result<Option<Job>, AppError>;

    /// Finish a job successfully.
    async fn mark_completed(&self, job_id: Uuid, result: serde_json::Value)
        -> Result<(), AppError>;

    /// Finish a job as permanently failed.
    async fn mark_failed(&self, job_id: Uuid, result: serde_json::Value) -> Result<(), AppError>;

    /// Put a failed job back on the queue after a backoff delay.
    async fn schedule_retry(&self, job_id: Uuid, backoff_seconds: u64) -> Result<Job, AppError>;
}

/// In-memory status store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStatusStore {
    records: Mutex<HashMap<Uuid, StatusRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn create(&self, corr_id: Uuid) -> Result<StatusRecord, AppError> {
        let record = StatusRecord::received(corr_id);
        let mut records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("status store lock poisoned".to_string()))?;
        records.insert(corr_id, record.clone());
        Ok(record)
    }

    async fn get(&self, corr_id: Uuid) -> Result<Option<StatusRecord>, AppError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("status store lock poisoned".to_string()))?;
        Ok(records.get(&corr_id).cloned())
    }

    async fn transition(
        &self,
        corr_id: Uuid,
        next: PipelineStatus,
        findings: Option<Vec<Finding>>,
        links: Option<StatusLinks>,
    ) -> Result<StatusRecord, AppError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("status store lock poisoned".to_string()))?;
        let record = records
            .get_mut(&corr_id)
            .ok_or_else(|| AppError::NotFound(format!("No status record for {}", corr_id)))?;

        if !record.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        record.last_update = Utc::now();
        if findings.is_some() {
            record.findings = findings;
        }
        if links.is_some() {
            record.links = links;
        }
        Ok(record.clone())
    }
}
