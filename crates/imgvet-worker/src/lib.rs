//! Imgvet Worker – background job queue and worker infrastructure.
//!
//! This crate provides the job queue (polling, retry, worker pool), the
//! `JobHandlerContext` trait, and an in-memory job store. The API implements
//! the trait for its application state and dispatches to the stage handlers;
//! the handlers themselves remain in the API crate.

mod context;
mod memory;
mod queue;

pub use context::JobHandlerContext;
pub use memory::MemoryJobStore;
pub use queue::{JobQueue, JOB_NOTIFY_CHANNEL, MAX_RETRY_BACKOFF_SECS};
