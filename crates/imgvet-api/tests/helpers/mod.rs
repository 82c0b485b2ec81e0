//! Shared test fixtures: an in-memory application, image fixtures, and a
//! synchronous job drain so pipeline outcomes can be asserted without racing
//! the background worker pool.

use anyhow::Result;
use axum_test::TestServer;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use imgvet_api::setup::{build_state, routes::setup_routes};
use imgvet_api::AppState;
use imgvet_core::{
    Config, JobStore, MemoryStatusStore, QueueConfig, StorageBackend, StoreBackend,
};
use imgvet_services::{AllowAllSafety, ContentSafety, MemoryPublisher, SignatureScanner};
use imgvet_storage::MemoryArtifactStore;
use imgvet_worker::{JobHandlerContext, MemoryJobStore};

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub job_store: Arc<MemoryJobStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub events: Arc<MemoryPublisher>,
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        environment: "test".to_string(),
        cors_origins: vec!["*".to_string()],
        master_api_key: None,
        store_backend: StoreBackend::Memory,
        database_url: None,
        storage_backend: StorageBackend::Memory,
        local_storage_path: None,
        local_storage_base_url: None,
        url_signing_secret: "test-signing-secret".to_string(),
        sas_ttl_seconds: 300,
        max_upload_bytes: 10 * 1024 * 1024,
        allowed_content_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
        queue: QueueConfig {
            max_workers: 2,
            // Slow poll so the drain loop below does the dispatching.
            poll_interval_ms: 60_000,
            max_retries: 3,
            default_timeout_seconds: 300,
        },
        safety_endpoint: None,
        safety_api_key: None,
        safety_timeout_seconds: 10,
        webhook_endpoint: None,
        webhook_secret: None,
    }
}

pub fn spawn_app_with(config: Config, safety: Arc<dyn ContentSafety>) -> Result<TestApp> {
    let job_store = Arc::new(MemoryJobStore::new());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let events = Arc::new(MemoryPublisher::new());

    let state = build_state(
        config.clone(),
        Arc::new(MemoryStatusStore::new()),
        job_store.clone(),
        artifacts.clone(),
        None,
        SignatureScanner::new(),
        safety,
        events.clone(),
    );

    let router = setup_routes(&config, state.clone())?;
    let server = TestServer::new(router).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(TestApp {
        server,
        state,
        job_store,
        artifacts,
        events,
    })
}

pub fn spawn_app() -> Result<TestApp> {
    spawn_app_with(test_config(), Arc::new(AllowAllSafety))
}

impl TestApp {
    /// Run queued jobs to completion in the test task, mirroring what the
    /// worker pool does. Failed jobs are retried immediately until their
    /// retry budget is spent.
    pub async fn drain_jobs(&self) {
        for _ in 0..200 {
            if self.job_store.open_jobs() == 0 {
                return;
            }
            let job = match self.job_store.claim_next().await.expect("claim failed") {
                Some(job) => job,
                None => {
                    // A job exists but is not due or is held by the pool.
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };
            match self.state.clone().dispatch_job(&job).await {
                Ok(result) => {
                    self.job_store
                        .mark_completed(job.id, result)
                        .await
                        .expect("mark_completed failed");
                }
                Err(e) => {
                    let unrecoverable = e
                        .downcast_ref::<imgvet_core::JobError>()
                        .map(|je| !je.is_recoverable())
                        .unwrap_or(false);
                    let result = serde_json::json!({ "error": e.to_string() });
                    if unrecoverable || !job.can_retry() {
                        self.job_store
                            .mark_failed(job.id, result)
                            .await
                            .expect("mark_failed failed");
                    } else {
                        self.job_store
                            .schedule_retry(job.id, 0)
                            .await
                            .expect("schedule_retry failed");
                    }
                }
            }
        }
        panic!("job queue did not drain");
    }
}

/// A 4x4 RGB PNG produced by the real encoder, so the analyze stage can
/// decode it.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([120, 20, 220]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode failed");
    out.into_inner()
}

/// A small real JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("jpeg encode failed");
    out.into_inner()
}

/// A valid-looking PNG carrying the scanner's test signature.
pub fn infected_png_bytes() -> Vec<u8> {
    let mut data = png_bytes();
    data.extend_from_slice(b"VIR");
    data
}
