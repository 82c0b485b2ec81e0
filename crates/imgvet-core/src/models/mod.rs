//! Domain models: pipeline status state machine, queue jobs, and message
//! envelopes exchanged between stages.

pub mod job;
pub mod message;
pub mod status;

pub use job::{Job, JobStatus, JobType};
pub use message::{
    AnalyzeRequest, CompletionEvent, ScanRequest, ANALYZE_CHANNEL, COMPLETION_EVENT_TYPE,
    SCAN_CHANNEL,
};
pub use status::{Finding, PipelineStatus, QuarantineReason, StatusLinks, StatusRecord};
