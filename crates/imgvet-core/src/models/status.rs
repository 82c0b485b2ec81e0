//! Pipeline status state machine and the client-pollable status record.
//!
//! The wire values of [`PipelineStatus`] are a stable contract with polling
//! clients and must not change:
//! `received|scanning|quarantined|unsafe|analyzing|complete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a correlation id currently is in the pipeline.
///
/// Transitions are monotonic along the edges encoded in
/// [`can_transition_to`](PipelineStatus::can_transition_to); terminal states
/// are never left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Received,
    Scanning,
    Quarantined,
    Unsafe,
    Analyzing,
    Complete,
}

impl PipelineStatus {
    /// Terminal states: no stage ever writes past these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Quarantined | PipelineStatus::Unsafe | PipelineStatus::Complete
        )
    }

    /// Whether a write moving this record to `next` is allowed.
    ///
    /// Same-state rewrites are permitted so that status updates stay
    /// idempotent under at-least-once message redelivery.
    pub fn can_transition_to(&self, next: PipelineStatus) -> bool {
        use PipelineStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Received, Scanning)
                | (Received, Quarantined)
                | (Received, Unsafe)
                | (Scanning, Analyzing)
                | (Scanning, Quarantined)
                | (Scanning, Unsafe)
                | (Analyzing, Complete)
        )
    }
}

impl Display for PipelineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PipelineStatus::Received => write!(f, "received"),
            PipelineStatus::Scanning => write!(f, "scanning"),
            PipelineStatus::Quarantined => write!(f, "quarantined"),
            PipelineStatus::Unsafe => write!(f, "unsafe"),
            PipelineStatus::Analyzing => write!(f, "analyzing"),
            PipelineStatus::Complete => write!(f, "complete"),
        }
    }
}

impl FromStr for PipelineStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(PipelineStatus::Received),
            "scanning" => Ok(PipelineStatus::Scanning),
            "quarantined" => Ok(PipelineStatus::Quarantined),
            "unsafe" => Ok(PipelineStatus::Unsafe),
            "analyzing" => Ok(PipelineStatus::Analyzing),
            "complete" => Ok(PipelineStatus::Complete),
            _ => Err(anyhow::anyhow!("Invalid pipeline status: {}", s)),
        }
    }
}

/// Why an artifact was quarantined; stored as a tag on the quarantine copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    Virus,
    Unsafe,
    SafetyUnavailable,
}

impl QuarantineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineReason::Virus => "virus",
            QuarantineReason::Unsafe => "unsafe",
            QuarantineReason::SafetyUnavailable => "safety_unavailable",
        }
    }

    /// Status the record ends in for this reason.
    pub fn terminal_status(&self) -> PipelineStatus {
        match self {
            QuarantineReason::Virus => PipelineStatus::Quarantined,
            QuarantineReason::Unsafe | QuarantineReason::SafetyUnavailable => {
                PipelineStatus::Unsafe
            }
        }
    }
}

impl Display for QuarantineReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuarantineReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "virus" => Ok(QuarantineReason::Virus),
            "unsafe" => Ok(QuarantineReason::Unsafe),
            "safety_unavailable" => Ok(QuarantineReason::SafetyUnavailable),
            _ => Err(anyhow::anyhow!("Invalid quarantine reason: {}", s)),
        }
    }
}

/// A single analysis or scan finding attached to a status record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Finding {
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Links attached to a completed record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_blob_url: Option<String>,
}

/// The durable, client-pollable projection of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub corr_id: Uuid,
    pub status: PipelineStatus,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<StatusLinks>,
}

impl StatusRecord {
    /// Fresh record for a newly accepted upload.
    pub fn received(corr_id: Uuid) -> Self {
        Self {
            corr_id,
            status: PipelineStatus::Received,
            last_update: Utc::now(),
            findings: None,
            links: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        for (status, wire) in [
            (PipelineStatus::Received, "\"received\""),
            (PipelineStatus::Scanning, "\"scanning\""),
            (PipelineStatus::Quarantined, "\"quarantined\""),
            (PipelineStatus::Unsafe, "\"unsafe\""),
            (PipelineStatus::Analyzing, "\"analyzing\""),
            (PipelineStatus::Complete, "\"complete\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), wire);
            assert_eq!(status.to_string(), wire.trim_matches('"'));
            assert_eq!(
                wire.trim_matches('"').parse::<PipelineStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn happy_path_edges_allowed() {
        use PipelineStatus::*;
        assert!(Received.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Complete));
    }

    #[test]
    fn quarantine_edges_allowed() {
        use PipelineStatus::*;
        assert!(Received.can_transition_to(Quarantined));
        assert!(Received.can_transition_to(Unsafe));
        assert!(Scanning.can_transition_to(Quarantined));
        assert!(Scanning.can_transition_to(Unsafe));
    }

    #[test]
    fn terminal_states_never_left() {
        use PipelineStatus::*;
        for terminal in [Quarantined, Unsafe, Complete] {
            assert!(terminal.is_terminal());
            for next in [Received, Scanning, Analyzing, Complete, Quarantined, Unsafe] {
                if next != terminal {
                    assert!(
                        !terminal.can_transition_to(next),
                        "{terminal} -> {next} must be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn no_backward_edges() {
        use PipelineStatus::*;
        assert!(!Scanning.can_transition_to(Received));
        assert!(!Analyzing.can_transition_to(Scanning));
        assert!(!Analyzing.can_transition_to(Received));
        // Quarantine is only reachable from received/scanning
        assert!(!Analyzing.can_transition_to(Quarantined));
        assert!(!Received.can_transition_to(Analyzing));
        assert!(!Received.can_transition_to(Complete));
    }

    #[test]
    fn same_state_rewrite_allowed_in_flight() {
        use PipelineStatus::*;
        assert!(Scanning.can_transition_to(Scanning));
        assert!(Analyzing.can_transition_to(Analyzing));
    }

    #[test]
    fn quarantine_reason_maps_to_terminal_status() {
        assert_eq!(
            QuarantineReason::Virus.terminal_status(),
            PipelineStatus::Quarantined
        );
        assert_eq!(
            QuarantineReason::Unsafe.terminal_status(),
            PipelineStatus::Unsafe
        );
        assert_eq!(
            QuarantineReason::SafetyUnavailable.terminal_status(),
            PipelineStatus::Unsafe
        );
        assert_eq!(QuarantineReason::SafetyUnavailable.as_str(), "safety_unavailable");
    }

    #[test]
    fn quarantine_reason_round_trips_through_tag_value() {
        for reason in [
            QuarantineReason::Virus,
            QuarantineReason::Unsafe,
            QuarantineReason::SafetyUnavailable,
        ] {
            assert_eq!(reason.as_str().parse::<QuarantineReason>().unwrap(), reason);
        }
        assert!("ransomware".parse::<QuarantineReason>().is_err());
    }

    #[test]
    fn status_record_serializes_camel_case() {
        let mut record = StatusRecord::received(Uuid::new_v4());
        record.links = Some(StatusLinks {
            result_blob_url: Some("http://example/results.json".into()),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("lastUpdate").is_some());
        assert!(json.get("corrId").is_some());
        assert_eq!(
            json.pointer("/links/resultBlobUrl").and_then(|v| v.as_str()),
            Some("http://example/results.json")
        );
        // findings omitted when absent
        assert!(json.get("findings").is_none());
    }
}
