//! Pipeline stage handlers, invoked by the worker pool via job dispatch.
//!
//! Each stage parses its message envelope from the job payload, does its
//! work, and advances the status record. Every quarantine outcome is
//! unrecoverable by construction: the artifact has moved and the record is
//! terminal, so redelivery must not rerun the stage.

pub mod analyze;
pub mod scan;

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use uuid::Uuid;

use imgvet_core::models::{Finding, PipelineStatus, QuarantineReason};
use imgvet_core::AppError;
use imgvet_storage::{Namespace, StorageError};

use crate::state::AppState;

/// Split a `{namespace}/{name}` key and return the artifact name, checking
/// the namespace matches what the stage expects.
fn artifact_name<'a>(blob_url: &'a str, expected: Namespace) -> Result<&'a str> {
    let (namespace, name) = blob_url
        .split_once('/')
        .ok_or_else(|| anyhow!("Malformed blob url: {}", blob_url))?;
    if namespace != expected.as_str() || name.is_empty() {
        return Err(anyhow!(
            "Blob url {} is not in the {} namespace",
            blob_url,
            expected
        ));
    }
    Ok(name)
}

/// Move an artifact out of the incoming namespace and settle its record.
///
/// Order matters for crash safety: copy to quarantine first, then tag, then
/// delete the incoming copy, then write the terminal status. A crash between
/// any two steps leaves the redelivered job able to finish (copy overwrite
/// and delete of a missing artifact are both tolerated).
async fn quarantine(
    state: &AppState,
    corr_id: Uuid,
    name: &str,
    reason: QuarantineReason,
    findings: Option<Vec<Finding>>,
) -> Result<()> {
    let store = &state.artifact_store;

    match store
        .copy(Namespace::Incoming, name, Namespace::Quarantine, name)
        .await
    {
        Ok(_) => {}
        // A redelivered job finds the incoming copy already gone; as long as
        // the quarantine copy exists, the move already happened.
        Err(StorageError::NotFound(_))
            if store.exists(Namespace::Quarantine, name).await.unwrap_or(false) => {}
        Err(e) => return Err(e).context("Failed to copy artifact to quarantine"),
    }

    let mut tags = HashMap::new();
    tags.insert("reason".to_string(), reason.as_str().to_string());
    tags.insert("corrId".to_string(), corr_id.to_string());
    store
        .set_tags(Namespace::Quarantine, name, tags)
        .await
        .context("Failed to tag quarantined artifact")?;

    store
        .delete(Namespace::Incoming, name)
        .await
        .context("Failed to delete incoming artifact")?;

    transition_tolerant(state, corr_id, reason.terminal_status(), findings).await?;

    tracing::warn!(
        corr_id = %corr_id,
        reason = %reason,
        "Artifact quarantined"
    );
    Ok(())
}

/// A redelivered job that finds the incoming artifact gone may be resuming a
/// quarantine whose terminal status write failed. If the quarantine copy is
/// there, finish settling the record from its `reason` tag so it cannot stay
/// stuck in a non-terminal state. Returns whether a quarantine copy was found.
async fn settle_from_quarantine(state: &AppState, corr_id: Uuid, name: &str) -> Result<bool> {
    match state.artifact_store.tags(Namespace::Quarantine, name).await {
        Ok(tags) => {
            let reason: QuarantineReason = tags
                .get("reason")
                .ok_or_else(|| anyhow!("Quarantined artifact {} has no reason tag", name))?
                .parse()?;
            transition_tolerant(state, corr_id, reason.terminal_status(), None).await?;
            tracing::warn!(
                corr_id = %corr_id,
                reason = %reason,
                "Settled interrupted quarantine on redelivery"
            );
            Ok(true)
        }
        Err(StorageError::NotFound(_)) => Ok(false),
        Err(e) => Err(e).context("Failed to read quarantine tags"),
    }
}

/// Advance the status record, treating a rejected transition on an already
/// terminal record as a no-op so redelivered messages stay idempotent.
async fn transition_tolerant(
    state: &AppState,
    corr_id: Uuid,
    next: PipelineStatus,
    findings: Option<Vec<Finding>>,
) -> Result<bool> {
    match state
        .status_store
        .transition(corr_id, next, findings, None)
        .await
    {
        Ok(_) => Ok(true),
        Err(AppError::InvalidTransition { from, .. }) if from.is_terminal() => {
            tracing::info!(
                corr_id = %corr_id,
                status = %from,
                "Record already terminal, skipping redelivered stage"
            );
            Ok(false)
        }
        Err(e) => Err(e).context("Status transition failed"),
    }
}
