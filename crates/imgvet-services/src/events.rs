//! Completion event publisher.
//!
//! When an artifact finishes the pipeline, a `content.analyzed` event goes
//! out to the configured webhook. Delivery is best-effort: the pipeline
//! outcome is already durable in the status store, so a failed delivery is
//! logged and dropped rather than retried at the stage level.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Mutex;
use std::time::Duration;

use imgvet_core::models::{CompletionEvent, COMPLETION_EVENT_TYPE};

type HmacSha256 = Hmac<Sha256>;

/// Webhook envelope around a completion event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub timestamp: DateTime<Utc>,
    pub data: CompletionEvent,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: CompletionEvent) -> Result<()>;
}

/// Discards events. Used when no webhook endpoint is configured.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, event: CompletionEvent) -> Result<()> {
        tracing::debug!(corr_id = %event.corr_id, "No event sink configured, dropping event");
        Ok(())
    }
}

/// Collects events in memory. Used by tests.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<CompletionEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: CompletionEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event sink lock poisoned"))?
            .push(event);
        Ok(())
    }
}

/// Delivers events over HTTP with an HMAC-SHA256 signature header.
pub struct WebhookPublisher {
    client: reqwest::Client,
    endpoint: String,
    signing_secret: String,
}

impl WebhookPublisher {
    pub fn new(endpoint: String, signing_secret: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            signing_secret,
        })
    }

    fn sign_payload(&self, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .context("Invalid signing secret")?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    #[tracing::instrument(skip(self, event), fields(corr_id = %event.corr_id))]
    async fn publish(&self, event: CompletionEvent) -> Result<()> {
        let payload = EventPayload {
            event_type: COMPLETION_EVENT_TYPE,
            timestamp: Utc::now(),
            data: event,
        };
        let body =
            serde_json::to_string(&payload).context("Failed to serialize event payload")?;
        let signature = self.sign_payload(&body)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", format!("v1={}", signature))
            .body(body)
            .send()
            .await
            .context("Failed to send event webhook")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Event webhook returned non-2xx status: {}", status);
        }

        tracing::info!(status = %status, "Completion event delivered");
        Ok(())
    }
}
