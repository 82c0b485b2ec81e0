//! Content safety client.
//!
//! The analyze stage asks this service whether an image is safe to keep.
//! The HTTP client is fail-closed: any transport or protocol failure is an
//! error the caller must treat as "safety unavailable", never as a pass.
//! Deployments without a configured endpoint use [`AllowAllSafety`], which
//! skips classification entirely.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use imgvet_core::models::Finding;

/// Classification result for one artifact.
#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub findings: Vec<Finding>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            findings: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ContentSafety: Send + Sync {
    async fn classify(&self, data: &[u8], content_type: &str) -> Result<SafetyVerdict>;
}

/// Pass-through used when no safety endpoint is configured.
pub struct AllowAllSafety;

#[async_trait]
impl ContentSafety for AllowAllSafety {
    async fn classify(&self, _data: &[u8], _content_type: &str) -> Result<SafetyVerdict> {
        Ok(SafetyVerdict::safe())
    }
}

#[derive(Debug, Deserialize)]
struct SafetyResponse {
    safe: bool,
    #[serde(default)]
    findings: Vec<Finding>,
}

/// HTTP content safety client.
pub struct HttpSafetyClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSafetyClient {
    pub fn new(endpoint: String, api_key: Option<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build safety HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ContentSafety for HttpSafetyClient {
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn classify(&self, data: &[u8], content_type: &str) -> Result<SafetyVerdict> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", content_type)
            .body(data.to_vec());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Safety service request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Safety service returned {}", status);
        }

        let parsed: SafetyResponse = response
            .json()
            .await
            .context("Safety service returned malformed response")?;

        tracing::info!(
            safe = parsed.safe,
            findings = parsed.findings.len(),
            "Safety classification completed"
        );

        Ok(SafetyVerdict {
            safe: parsed.safe,
            findings: parsed.findings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_is_always_safe() {
        let verdict = AllowAllSafety.classify(&[1, 2, 3], "image/png").await.unwrap();
        assert!(verdict.safe);
        assert!(verdict.findings.is_empty());
    }

    #[test]
    fn response_findings_default_to_empty() {
        let parsed: SafetyResponse = serde_json::from_str(r#"{"safe": false}"#).unwrap();
        assert!(!parsed.safe);
        assert!(parsed.findings.is_empty());
    }
}
