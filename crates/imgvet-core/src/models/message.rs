//! Message envelopes passed between stages and the completion event payload.
//!
//! Envelope JSON uses camelCase field names; `corrId` is mandatory and
//! immutable across the whole chain. `blobUrl` is a stable locator
//! (namespace + name), never a byte copy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Logical channel carrying ingest -> scan messages.
pub const SCAN_CHANNEL: &str = "ingest.scan";

/// Logical channel carrying scan -> analyze messages.
pub const ANALYZE_CHANNEL: &str = "ingest.analyze";

/// Event type published to the notification sink on completion.
pub const COMPLETION_EVENT_TYPE: &str = "content.analyzed";

/// Ingest -> scan envelope: where the artifact lives plus a short-lived
/// scoped read URL and the metadata recorded at ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub corr_id: Uuid,
    pub blob_url: String,
    pub sas_url: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Scan -> analyze envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub corr_id: Uuid,
    pub blob_url: String,
}

/// Fire-and-forget completion event published after analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub corr_id: Uuid,
    pub result_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_request_wire_shape() {
        let corr_id = Uuid::new_v4();
        let mut meta = HashMap::new();
        meta.insert("contentType".to_string(), "image/png".to_string());
        let req = ScanRequest {
            corr_id,
            blob_url: "incoming/abc".into(),
            sas_url: "incoming/abc?token=xyz".into(),
            meta,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json.get("corrId").and_then(|v| v.as_str()),
            Some(corr_id.to_string().as_str())
        );
        assert!(json.get("blobUrl").is_some());
        assert!(json.get("sasUrl").is_some());
        assert!(json.get("meta").is_some());

        let back: ScanRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn scan_request_meta_defaults_to_empty() {
        let corr_id = Uuid::new_v4();
        let json = serde_json::json!({
            "corrId": corr_id,
            "blobUrl": "incoming/abc",
            "sasUrl": "incoming/abc?token=xyz",
        });
        let req: ScanRequest = serde_json::from_value(json).unwrap();
        assert!(req.meta.is_empty());
    }

    #[test]
    fn completion_event_wire_shape() {
        let event = CompletionEvent {
            corr_id: Uuid::new_v4(),
            result_url: "analysis/abc.json".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("resultUrl").is_some());
        assert!(json.get("corrId").is_some());
    }
}
