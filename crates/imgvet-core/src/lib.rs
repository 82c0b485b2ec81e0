//! Imgvet Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! adapter contracts shared across all imgvet components: the pipeline state
//! machine, message envelopes, content sniffing, and the status/job store
//! traits the stages coordinate through.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;
pub mod sniff;
pub mod store;

// Re-export commonly used types
pub use config::{Config, QueueConfig, StorageBackend, StoreBackend};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
pub use store::{JobStore, MemoryStatusStore, StatusStore};
