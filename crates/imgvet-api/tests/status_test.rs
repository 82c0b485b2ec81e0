mod helpers;

use serde_json::Value;
use uuid::Uuid;

use helpers::{png_bytes, spawn_app};

#[tokio::test]
async fn blank_corr_id_is_rejected() {
    let app = spawn_app().unwrap();

    let response = app.server.get("/status/%20").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn malformed_corr_id_is_rejected() {
    let app = spawn_app().unwrap();

    let response = app.server.get("/status/not-a-uuid").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn unknown_corr_id_is_not_found() {
    let app = spawn_app().unwrap();

    let response = app.server.get(&format!("/status/{}", Uuid::new_v4())).await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn fresh_record_reports_received() {
    let app = spawn_app().unwrap();

    let body = png_bytes();
    let accepted = app
        .server
        .post("/ingest")
        .content_type("image/png")
        .add_header("x-content-size", body.len().to_string())
        .bytes(body.into())
        .await;
    let body: Value = accepted.json();
    let corr_id = body["corrId"].as_str().unwrap().to_string();

    let response = app.server.get(&format!("/status/{}", corr_id)).await;
    assert_eq!(response.status_code(), 200);
    let record: Value = response.json();
    // Nothing has drained the queue, so the record is still at intake.
    assert_eq!(record["status"].as_str(), Some("received"));
    assert!(record.get("findings").is_none());
    assert!(record.get("links").is_none());
}
