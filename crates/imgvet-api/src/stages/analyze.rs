//! Analysis stage, the terminal success path.
//!
//! Decodes the clean artifact, writes the durable analysis report to the
//! analysis namespace, completes the status record, and publishes the
//! completion event.

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use imgvet_core::models::{AnalyzeRequest, CompletionEvent, PipelineStatus, StatusLinks};
use imgvet_core::{AppError, JobError, JobResultExt};
use imgvet_storage::{Namespace, StorageError};

use crate::stages::{artifact_name, settle_from_quarantine, transition_tolerant};
use crate::state::AppState;

#[tracing::instrument(skip(state, job), fields(job_id = %job.id, corr_id = %job.corr_id))]
pub async fn handle(state: &AppState, job: &imgvet_core::models::Job) -> Result<serde_json::Value> {
    let request: AnalyzeRequest = serde_json::from_value(job.payload.clone())
        .context("Invalid analyze message payload")
        .unrecoverable()
        .map_err(anyhow::Error::new)?;

    if !transition_tolerant(state, request.corr_id, PipelineStatus::Analyzing, None).await? {
        return Ok(json!({ "skipped": "terminal" }));
    }

    let name = artifact_name(&request.blob_url, Namespace::Incoming)
        .map_err(|e| anyhow::Error::new(JobError::unrecoverable(e)))?;

    let data = match state.artifact_store.get(Namespace::Incoming, name).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) => {
            if settle_from_quarantine(state, request.corr_id, name).await? {
                return Ok(json!({ "skipped": "quarantined" }));
            }
            tracing::info!(corr_id = %request.corr_id, "Incoming artifact gone, skipping analyze");
            return Ok(json!({ "skipped": "artifact_missing" }));
        }
        Err(e) => return Err(anyhow!(e)).context("Failed to read incoming artifact"),
    };

    let report = state
        .analyzer
        .analyze(request.corr_id, data)
        .await
        .context("Image analysis failed")?;

    let result_name = format!("{}.json", request.corr_id);
    let report_bytes =
        serde_json::to_vec(&report).context("Failed to serialize analysis report")?;
    let result_key = state
        .artifact_store
        .put(
            Namespace::Analysis,
            &result_name,
            "application/json",
            report_bytes,
            Default::default(),
        )
        .await
        .context("Failed to store analysis report")?;

    match state
        .status_store
        .transition(
            request.corr_id,
            PipelineStatus::Complete,
            Some(report.findings.clone()),
            Some(StatusLinks {
                result_blob_url: Some(result_key.clone()),
            }),
        )
        .await
    {
        Ok(_) => {}
        Err(AppError::InvalidTransition { from, .. }) if from.is_terminal() => {
            return Ok(json!({ "skipped": "terminal" }));
        }
        Err(e) => return Err(e).context("Failed to complete status record"),
    }

    // Completion is already durable; notification failure never fails the job.
    let event = CompletionEvent {
        corr_id: request.corr_id,
        result_url: result_key.clone(),
    };
    if let Err(e) = state.events.publish(event).await {
        tracing::warn!(corr_id = %request.corr_id, error = %e, "Completion event publish failed");
    }

    tracing::info!(corr_id = %request.corr_id, result = %result_key, "Analysis complete");
    Ok(json!({ "outcome": "complete", "resultBlobUrl": result_key }))
}
