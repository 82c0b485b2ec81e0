mod helpers;

use serde_json::Value;
use uuid::Uuid;

use helpers::{jpeg_bytes, png_bytes, spawn_app, spawn_app_with, test_config, TestApp};
use imgvet_services::AllowAllSafety;
use std::sync::Arc;

/// A rejected upload must leave nothing behind: no blob, no queued job.
fn assert_no_side_effects(app: &TestApp) {
    assert_eq!(app.job_store.open_jobs(), 0);
    assert!(app.artifacts.keys().is_empty());
}

#[tokio::test]
async fn accepts_png_upload() {
    let app = spawn_app().unwrap();
    let body = png_bytes();

    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), 202);
    let body: Value = response.json();
    let corr_id = body["corrId"].as_str().expect("corrId missing");
    Uuid::parse_str(corr_id).expect("corrId is not a UUID");

    // A status record exists immediately, before any stage has run.
    let status = app.server.get(&format!("/status/{}", corr_id)).await;
    assert_eq!(status.status_code(), 200);
    let record: Value = status.json();
    assert_eq!(record["corrId"].as_str(), Some(corr_id));
    assert!(record["lastUpdate"].is_string());
}

#[tokio::test]
async fn accepts_jpeg_upload() {
    let app = spawn_app().unwrap();
    let body = jpeg_bytes();

    let response = app
        .server
        .post("/ingest")
        .content_type("image/jpeg")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), 202);
}

#[tokio::test]
async fn rejects_disallowed_content_type() {
    let app = spawn_app().unwrap();

    let response = app
        .server
        .post("/ingest")
        .content_type("text/plain")
        .add_header("x-content-size", "5")
        .bytes(b"hello".to_vec().into())
        .await;

    assert_eq!(response.status_code(), 415);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_spoofed_content_type() {
    let app = spawn_app().unwrap();

    // Declared PNG, but the bytes are not an image at all.
    let body = b"<html>not an image</html>".to_vec();
    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), 415);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn accepts_mislabeled_image_bytes() {
    let app = spawn_app().unwrap();
    let body = jpeg_bytes();

    // Declared PNG, actual JPEG: any recognized image signature passes, and
    // the sniffed type is what gets recorded.
    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), 202);
}

#[tokio::test]
async fn rejects_empty_body() {
    let app = spawn_app().unwrap();

    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", "10")
        .bytes(Vec::new().into())
        .await;

    assert_eq!(response.status_code(), 400);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_oversized_body() {
    let mut config = test_config();
    config.max_upload_bytes = 64;
    let app = spawn_app_with(config, Arc::new(AllowAllSafety)).unwrap();

    // The size hint is within the cap but the body itself is not.
    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", "10")
        .bytes(png_bytes().into())
        .await;

    assert_eq!(response.status_code(), 413);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_oversized_declared_size() {
    let mut config = test_config();
    config.max_upload_bytes = 1024;
    let app = spawn_app_with(config, Arc::new(AllowAllSafety)).unwrap();

    // The size hint alone is enough to refuse, regardless of the body.
    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", "2048")
        .bytes(png_bytes().into())
        .await;

    assert_eq!(response.status_code(), 413);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_zero_declared_size() {
    let app = spawn_app().unwrap();

    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", "0")
        .bytes(png_bytes().into())
        .await;

    assert_eq!(response.status_code(), 413);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_missing_declared_size() {
    let app = spawn_app().unwrap();

    // The size header is part of the upload contract; absent reads as zero.
    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .bytes(png_bytes().into())
        .await;

    assert_eq!(response.status_code(), 413);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn rejects_invalid_declared_size() {
    let app = spawn_app().unwrap();

    let response = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", "not-a-number")
        .bytes(png_bytes().into())
        .await;

    assert_eq!(response.status_code(), 400);
    assert_no_side_effects(&app);
}

#[tokio::test]
async fn requires_api_key_when_configured() {
    let mut config = test_config();
    config.master_api_key = Some("test-master-key".to_string());
    let app = spawn_app_with(config, Arc::new(AllowAllSafety)).unwrap();
    let body = png_bytes();

    let unauthenticated = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.clone().into())
        .await;
    assert_eq!(unauthenticated.status_code(), 401);

    let wrong_key = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("Authorization", "Bearer wrong-key")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.clone().into())
        .await;
    assert_eq!(wrong_key.status_code(), 401);

    let authenticated = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("Authorization", "Bearer test-master-key")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;
    assert_eq!(authenticated.status_code(), 202);

    // Status polling stays public.
    let status = app
        .server
        .get(&format!("/status/{}", Uuid::new_v4()))
        .await;
    assert_eq!(status.status_code(), 404);
}
