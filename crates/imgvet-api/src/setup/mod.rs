//! Application setup and initialization
//!
//! All initialization logic lives here rather than in main.rs: store and
//! service construction, queue wiring, and route setup.

pub mod database;
pub mod routes;
pub mod server;

use anyhow::{Context, Result};
use std::sync::{Arc, Weak};

use imgvet_core::{Config, JobStore, MemoryStatusStore, StatusStore, StoreBackend};
use imgvet_db::{PgJobStore, PgStatusStore};
use imgvet_services::{
    AllowAllSafety, ContentSafety, EventPublisher, HttpSafetyClient, ImageAnalyzer, NullPublisher,
    SignatureScanner, WebhookPublisher,
};
use imgvet_storage::{create_artifact_store, ArtifactStore};
use imgvet_worker::{JobHandlerContext, JobQueue, MemoryJobStore};

use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    crate::telemetry::init_telemetry();
    tracing::info!(
        environment = %config.environment,
        store = ?config.store_backend,
        storage = ?config.storage_backend,
        "Configuration loaded and validated"
    );

    let (status_store, job_store, pool): (Arc<dyn StatusStore>, Arc<dyn JobStore>, _) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let pool = database::setup_database(&config).await?;
                (
                    Arc::new(PgStatusStore::new(pool.clone())),
                    Arc::new(PgJobStore::new(pool.clone())),
                    Some(pool),
                )
            }
            StoreBackend::Memory => (
                Arc::new(MemoryStatusStore::new()),
                Arc::new(MemoryJobStore::new()),
                None,
            ),
        };

    let artifact_store = create_artifact_store(&config)
        .await
        .context("Failed to initialize artifact store")?;

    let safety: Arc<dyn ContentSafety> = match &config.safety_endpoint {
        Some(endpoint) => Arc::new(HttpSafetyClient::new(
            endpoint.clone(),
            config.safety_api_key.clone(),
            config.safety_timeout_seconds,
        )?),
        None => {
            tracing::warn!("No content safety endpoint configured, all content passes");
            Arc::new(AllowAllSafety)
        }
    };

    let events: Arc<dyn EventPublisher> = match (&config.webhook_endpoint, &config.webhook_secret)
    {
        (Some(endpoint), Some(secret)) => {
            Arc::new(WebhookPublisher::new(endpoint.clone(), secret.clone())?)
        }
        _ => Arc::new(NullPublisher),
    };

    let state = build_state(
        config.clone(),
        status_store,
        job_store,
        artifact_store,
        pool,
        SignatureScanner::new(),
        safety,
        events,
    );

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}

/// Assemble the application state.
///
/// The queue's worker pool needs a handle back to the state for job
/// dispatch, while the state owns the queue. `Arc::new_cyclic` gives the
/// queue a weak reference to the state being built, so a dropped state also
/// stops job dispatch.
#[allow(clippy::too_many_arguments)]
pub fn build_state(
    config: Config,
    status_store: Arc<dyn StatusStore>,
    job_store: Arc<dyn JobStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    pool: Option<sqlx::PgPool>,
    scanner: SignatureScanner,
    safety: Arc<dyn ContentSafety>,
    events: Arc<dyn EventPublisher>,
) -> Arc<AppState> {
    let queue_config = config.queue.clone();
    Arc::new_cyclic(|weak: &Weak<AppState>| {
        let queue = JobQueue::new(
            job_store,
            queue_config,
            weak.clone() as Weak<dyn JobHandlerContext>,
            pool,
        );
        AppState {
            config,
            status_store,
            artifact_store,
            queue,
            scanner,
            safety,
            analyzer: ImageAnalyzer::new(),
            events,
        }
    })
}
