//! Malware scan and content safety stage.
//!
//! Reads the artifact from the incoming namespace and checks it in order:
//! malware first, safety second. Either check failing quarantines the
//! artifact; only a clean, safe artifact is forwarded to the analyze stage.
//! The safety client is fail-closed: an unavailable service quarantines with
//! reason `safety_unavailable` rather than letting content pass.

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use imgvet_core::models::{
    AnalyzeRequest, Finding, JobType, PipelineStatus, QuarantineReason, ScanRequest,
};
use imgvet_core::{sniff, JobError, JobResultExt};
use imgvet_services::ScanOutcome;
use imgvet_storage::{Namespace, StorageError};

use crate::stages::{artifact_name, quarantine, settle_from_quarantine, transition_tolerant};
use crate::state::AppState;

#[tracing::instrument(skip(state, job), fields(job_id = %job.id, corr_id = %job.corr_id))]
pub async fn handle(state: &AppState, job: &imgvet_core::models::Job) -> Result<serde_json::Value> {
    let request: ScanRequest = serde_json::from_value(job.payload.clone())
        .context("Invalid scan message payload")
        .unrecoverable()
        .map_err(anyhow::Error::new)?;

    if !transition_tolerant(state, request.corr_id, PipelineStatus::Scanning, None).await? {
        // Terminal already, nothing left to do for this redelivery.
        return Ok(json!({ "skipped": "terminal" }));
    }

    let name = artifact_name(&request.blob_url, Namespace::Incoming)
        .map_err(|e| anyhow::Error::new(JobError::unrecoverable(e)))?;

    let data = match state.artifact_store.get(Namespace::Incoming, name).await {
        Ok(data) => data,
        // The artifact was already moved by a previous delivery of this job.
        // If the move was a quarantine, the terminal status write may still
        // be outstanding; finish it before walking away.
        Err(StorageError::NotFound(_)) => {
            if settle_from_quarantine(state, request.corr_id, name).await? {
                return Ok(json!({ "skipped": "quarantined" }));
            }
            tracing::info!(corr_id = %request.corr_id, "Incoming artifact gone, skipping scan");
            return Ok(json!({ "skipped": "artifact_missing" }));
        }
        Err(e) => return Err(anyhow!(e)).context("Failed to read incoming artifact"),
    };

    match state.scanner.scan_bytes(&data).await {
        ScanOutcome::Clean => {}
        ScanOutcome::Infected(signature) => {
            let findings = vec![Finding {
                labels: vec!["virus".to_string(), signature.clone()],
                score: None,
            }];
            quarantine(
                state,
                request.corr_id,
                name,
                QuarantineReason::Virus,
                Some(findings),
            )
            .await?;

            return Err(anyhow::Error::new(JobError::unrecoverable(anyhow!(
                "Artifact quarantined: signature {} detected",
                signature
            ))));
        }
        ScanOutcome::Error(message) => {
            // Scanner unavailability is transient; leave the record in
            // scanning and let the retry policy redeliver.
            return Err(anyhow::Error::new(JobError::recoverable(anyhow!(
                "Scanner unavailable: {}",
                message
            ))));
        }
    }

    let content_type = sniff::detect(&data)
        .map(|t| t.mime().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match state.safety.classify(&data, &content_type).await {
        Ok(verdict) if verdict.safe => {}
        Ok(verdict) => {
            quarantine(
                state,
                request.corr_id,
                name,
                QuarantineReason::Unsafe,
                Some(verdict.findings),
            )
            .await?;
            return Err(anyhow::Error::new(JobError::unrecoverable(anyhow!(
                "Artifact quarantined: unsafe content"
            ))));
        }
        // Fail closed: content that cannot be classified must not pass.
        Err(e) => {
            tracing::error!(
                corr_id = %request.corr_id,
                error = %e,
                "Content safety unavailable, quarantining"
            );
            let findings = vec![Finding {
                labels: vec!["safety_unavailable".to_string()],
                score: None,
            }];
            quarantine(
                state,
                request.corr_id,
                name,
                QuarantineReason::SafetyUnavailable,
                Some(findings),
            )
            .await?;
            return Err(anyhow::Error::new(JobError::unrecoverable(anyhow!(
                "Artifact quarantined: content safety unavailable"
            ))));
        }
    }

    let analyze = AnalyzeRequest {
        corr_id: request.corr_id,
        blob_url: request.blob_url.clone(),
    };
    state
        .queue
        .submit(
            request.corr_id,
            JobType::Analyze,
            serde_json::to_value(&analyze)?,
        )
        .await
        .context("Failed to enqueue analyze job")?;

    tracing::info!(corr_id = %request.corr_id, "Scan clean and safe, forwarded to analyze");
    Ok(json!({ "outcome": "clean" }))
}
