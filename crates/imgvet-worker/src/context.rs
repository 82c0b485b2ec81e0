//! Job handler context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `dispatch_job` when processing a claimed job; the implementation matches on
//! job type and invokes the appropriate stage handler.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use imgvet_core::models::Job;

/// Context for job dispatch.
///
/// Implemented by the API's application state. The worker holds a weak
/// reference and calls `dispatch_job` when processing a claimed job.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Dispatch a job to the appropriate stage handler and return the result.
    async fn dispatch_job(self: Arc<Self>, job: &Job) -> Result<serde_json::Value>;
}
