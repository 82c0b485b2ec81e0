//! Queue job model: one row per stage invocation, claimed and retried by the
//! worker pool under at-least-once semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::message::{ANALYZE_CHANNEL, SCAN_CHANNEL};

/// Which stage a job belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scan,
    Analyze,
}

impl JobType {
    /// Logical channel name for this job type.
    pub fn channel(&self) -> &'static str {
        match self {
            JobType::Scan => SCAN_CHANNEL,
            JobType::Analyze => ANALYZE_CHANNEL,
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::Scan => write!(f, "scan"),
            JobType::Analyze => write!(f, "analyze"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(JobType::Scan),
            "analyze" => Ok(JobType::Analyze),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Scheduled,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "scheduled" => Ok(JobStatus::Scheduled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// A queued stage invocation. The payload is the stage's message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub corr_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the job has retries left under its policy.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_channels() {
        assert_eq!(JobType::Scan.channel(), "ingest.scan");
        assert_eq!(JobType::Analyze.channel(), "ingest.analyze");
    }

    #[test]
    fn job_type_round_trips() {
        assert_eq!("scan".parse::<JobType>().unwrap(), JobType::Scan);
        assert_eq!("analyze".parse::<JobType>().unwrap(), JobType::Analyze);
        assert!("transcode".parse::<JobType>().is_err());
    }

    #[test]
    fn retry_budget() {
        let mut job = Job {
            id: Uuid::new_v4(),
            corr_id: Uuid::new_v4(),
            job_type: JobType::Scan,
            status: JobStatus::Running,
            payload: serde_json::json!({}),
            result: None,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            timeout_seconds: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(job.can_retry());
        job.retry_count = 3;
        assert!(!job.can_retry());
    }
}
