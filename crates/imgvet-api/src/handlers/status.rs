use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use imgvet_core::models::StatusRecord;
use imgvet_core::AppError;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Poll the pipeline status of one correlation id.
#[utoipa::path(
    get,
    path = "/status/{corr_id}",
    tag = "pipeline",
    params(
        ("corr_id" = String, Path, description = "Correlation id returned by ingest")
    ),
    responses(
        (status = 200, description = "Current status record", body = StatusRecord),
        (status = 400, description = "Blank or malformed correlation id", body = ErrorResponse),
        (status = 404, description = "Unknown correlation id", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "get_status"))]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(corr_id): Path<String>,
) -> Result<Json<StatusRecord>, HttpAppError> {
    let trimmed = corr_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Correlation id must not be blank".to_string()).into());
    }

    let corr_id = Uuid::parse_str(trimmed)
        .map_err(|_| AppError::InvalidInput(format!("Invalid correlation id: {}", trimmed)))?;

    let record = state
        .status_store
        .get(corr_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No record for correlation id {}", corr_id)))?;

    Ok(Json(record))
}
