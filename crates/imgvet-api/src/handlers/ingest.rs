//! Upload entry point.
//!
//! Admission control happens entirely here: the declared content type must
//! be allowed, the bytes must carry a real image signature, and the size cap
//! is enforced against both the mandatory `X-Content-Size` header and the
//! actual body length. Accepted
//! uploads get a fresh correlation id, a `received` status record, and a scan
//! job; the response returns before any scanning happens.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use imgvet_core::models::{JobType, ScanRequest};
use imgvet_core::{sniff, AppError};
use imgvet_storage::{signed_url, Namespace};

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Upload size hint header, checked before the body is read so oversized
/// clients can be refused cheaply.
pub const CONTENT_SIZE_HEADER: &str = "x-content-size";

/// Ingest an image for scanning and analysis.
#[utoipa::path(
    post,
    path = "/ingest",
    tag = "pipeline",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 202, description = "Upload accepted, returns the correlation id"),
        (status = 400, description = "Empty or invalid body", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 413, description = "Payload exceeds the size cap", body = ErrorResponse),
        (status = 415, description = "Content type not allowed or spoofed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers, body), fields(operation = "ingest"))]
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), HttpAppError> {
    let config = &state.config;

    let declared_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .ok_or_else(|| AppError::UnsupportedMediaType("Missing Content-Type header".to_string()))?;

    if !config.allowed_content_types.contains(&declared_type) {
        return Err(AppError::UnsupportedMediaType(format!(
            "Content type {} is not allowed",
            declared_type
        ))
        .into());
    }

    // A missing size header reads as zero and is refused with the same 413
    // as a declared zero.
    let declared_size: i64 = headers
        .get(CONTENT_SIZE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("0")
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid {} header", CONTENT_SIZE_HEADER)))?;
    if declared_size <= 0 || declared_size as u64 > config.max_upload_bytes as u64 {
        return Err(AppError::PayloadTooLarge(format!(
            "Declared size {} is outside the limit of {} bytes",
            declared_size, config.max_upload_bytes
        ))
        .into());
    }

    if body.is_empty() {
        return Err(AppError::InvalidInput("Empty request body".to_string()).into());
    }
    if body.len() > config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "Body of {} bytes exceeds limit of {} bytes",
            body.len(),
            config.max_upload_bytes
        ))
        .into());
    }

    // The declared type is never trusted on its own; the bytes must carry a
    // recognized image signature. Either signature passes, the sniffed type
    // is what gets recorded.
    let sniffed = sniff::detect(&body).ok_or_else(|| {
        AppError::UnsupportedMediaType("Body is not a recognized image format".to_string())
    })?;

    let corr_id = Uuid::new_v4();
    let extension = match sniffed {
        sniff::SniffedType::Png => "png",
        sniff::SniffedType::Jpeg => "jpg",
    };
    let name = format!("{}.{}", corr_id, extension);

    let mut metadata = HashMap::new();
    metadata.insert("contentType".to_string(), sniffed.mime().to_string());
    metadata.insert("size".to_string(), body.len().to_string());

    let key = state
        .artifact_store
        .put(
            Namespace::Incoming,
            &name,
            sniffed.mime(),
            body.to_vec(),
            metadata.clone(),
        )
        .await
        .map_err(HttpAppError::from)?;

    state.status_store.create(corr_id).await?;

    let sas_url = signed_url::access_url(
        &key,
        Duration::from_secs(config.sas_ttl_seconds),
        config.url_signing_secret.as_bytes(),
    );
    let request = ScanRequest {
        corr_id,
        blob_url: key,
        sas_url,
        meta: metadata,
    };
    state
        .queue
        .submit(
            corr_id,
            JobType::Scan,
            serde_json::to_value(&request).map_err(AppError::from)?,
        )
        .await
        .map_err(|e| AppError::Queue(e.to_string()))?;

    tracing::info!(corr_id = %corr_id, size = body.len(), content_type = %declared_type, "Upload accepted");

    Ok((StatusCode::ACCEPTED, Json(json!({ "corrId": corr_id }))))
}
