use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use imgvet_core::models::{Job, JobType};
use imgvet_core::{Config, StatusStore};
use imgvet_services::{ContentSafety, EventPublisher, ImageAnalyzer, SignatureScanner};
use imgvet_storage::ArtifactStore;
use imgvet_worker::{JobHandlerContext, JobQueue};

use crate::stages;

/// Shared application state: configuration plus every service the handlers
/// and stages need. Wrapped in `Arc` and handed to axum as router state.
pub struct AppState {
    pub config: Config,
    pub status_store: Arc<dyn StatusStore>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub queue: JobQueue,
    pub scanner: SignatureScanner,
    pub safety: Arc<dyn ContentSafety>,
    pub analyzer: ImageAnalyzer,
    pub events: Arc<dyn EventPublisher>,
}

/// The worker pool holds a weak reference to this state and calls
/// `dispatch_job` for each claimed job. Matching on the job type keeps all
/// stage wiring in one place.
#[async_trait]
impl JobHandlerContext for AppState {
    async fn dispatch_job(self: Arc<Self>, job: &Job) -> Result<serde_json::Value> {
        tracing::debug!(
            job_id = %job.id,
            corr_id = %job.corr_id,
            channel = job.job_type.channel(),
            "Dispatching job"
        );

        match job.job_type {
            JobType::Scan => stages::scan::handle(&self, job).await,
            JobType::Analyze => stages::analyze::handle(&self, job).await,
        }
    }
}
